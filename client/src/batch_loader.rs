//! Incremental backfill of a container in fixed-width windows
//!
//! At most one window is in flight at a time. Capacity is discovered from the
//! first response, so the first window is requested blind as `[0, width)`.

use log::debug;

/// Half-open index range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u32,
    pub end: u32,
}

impl Window {
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// What to do after a window has been merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadProgress {
    Continue(Window),
    Finished,
}

#[derive(Debug)]
pub struct BatchLoader {
    batch_width: u32,
    cursor: u32,
    in_flight: Option<Window>,
    fully_loaded: bool,
}

impl BatchLoader {
    pub fn new(batch_width: u32) -> Self {
        Self {
            batch_width: batch_width.max(1),
            cursor: 0,
            in_flight: None,
            fully_loaded: false,
        }
    }

    /// Starts a full backfill from index 0.
    ///
    /// Returns the window to request, or `None` if the container is already
    /// loaded or a window is still outstanding.
    pub fn preload_all(&mut self, max_size: Option<u32>) -> Option<Window> {
        if self.fully_loaded || self.in_flight.is_some() {
            return None;
        }

        self.cursor = 0;
        self.request(0, self.batch_width, max_size)
    }

    /// Claims `[start, end)` as the in-flight window after clamping it into
    /// `[0, max(max_size, end)]`.
    ///
    /// The bound never falls below `end`, so a window reaching past the known
    /// capacity is sent as is and the server trims it. Refused while another
    /// window is in flight; a degenerate window is dropped.
    pub fn request(&mut self, start: u32, end: u32, max_size: Option<u32>) -> Option<Window> {
        if self.in_flight.is_some() {
            debug!("Load of [{}, {}) refused, window in flight", start, end);
            return None;
        }

        let upper = max_size.map_or(end, |size| size.max(end));
        let window = Window {
            start: start.min(upper),
            end: end.min(upper),
        };
        if window.is_empty() {
            return None;
        }

        self.in_flight = Some(window);
        Some(window)
    }

    /// Whether a response for a window starting at `start` is the one being waited on.
    pub fn is_expecting(&self, start: u32) -> bool {
        self.in_flight.is_some_and(|window| window.start == start)
    }

    /// Advances past the in-flight window once its data has been merged.
    ///
    /// `max_occupied_slot` is the index of the last occupied slot, so the window
    /// starting at that index still holds data. Loading finishes once the cursor
    /// moves past it, or immediately when nothing is occupied.
    pub fn complete_window(
        &mut self,
        max_size: Option<u32>,
        max_occupied_slot: Option<u32>,
    ) -> LoadProgress {
        self.in_flight = None;
        self.cursor = self.cursor.saturating_add(self.batch_width);

        let next = match max_occupied_slot {
            Some(high_water) if self.cursor <= high_water => self.request(
                self.cursor,
                self.cursor.saturating_add(self.batch_width),
                max_size,
            ),
            _ => None,
        };

        match next {
            Some(window) => LoadProgress::Continue(window),
            None => {
                self.fully_loaded = true;
                LoadProgress::Finished
            }
        }
    }

    pub fn batch_width(&self) -> u32 {
        self.batch_width
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn in_flight(&self) -> Option<Window> {
        self.in_flight
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded
    }
}
