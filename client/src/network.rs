use crate::events::{SlotEvent, Subscription};
use crate::input::{parse_command, Command, HELP};
use crate::inventory::SlotInventory;
use crate::policy::SyncConfig;
use crate::query::{paginate, SlotFilter};
use crate::transport::ChannelTransport;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ContainerKind, Packet, Request, SlotKey, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, sleep};

const PAGE_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("invalid server address: {0}")]
    Address(#[from] std::net::AddrParseError),
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    connected: bool,

    inventory: SlotInventory<ChannelTransport>,
    outbound: UnboundedReceiver<Request>,
    events: Subscription,

    fake_ping_ms: u64,
    last_find: Vec<SlotKey>,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        config: SyncConfig,
    ) -> Result<Self, ClientError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        let (transport, outbound) = ChannelTransport::channel();
        let mut inventory = SlotInventory::new(config, transport);
        let events = inventory.subscribe();

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            inventory,
            outbound,
            events,
            fake_ping_ms,
            last_find: Vec::new(),
        })
    }

    pub fn inventory(&self) -> &SlotInventory<ChannelTransport> {
        &self.inventory
    }

    async fn connect(&mut self) -> Result<(), ClientError> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                self.connected = true;

                for container in ContainerKind::ALL {
                    self.inventory.preload_all(container);
                }
            }

            Packet::Response(response) => {
                self.inventory.handle_response(response);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Runs a console command. Returns false when the client should exit.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Swap { from, to } => match self.inventory.exchange(from, to) {
                Some(id) => println!("request {} sent", id),
                None => println!("swap {} <-> {} refused", from, to),
            },
            Command::Drop(key) => match self.inventory.remove(key) {
                Some(id) => println!("request {} sent", id),
                None => println!("drop {} refused", key),
            },
            Command::Find(filter) => {
                self.last_find = self.inventory.filter(&filter);
                self.print_page(&filter, 0);
            }
            Command::Page(n) => self.print_page(&SlotFilter::default(), n),
            Command::Status => self.print_status(),
            Command::Help => println!("{}", HELP),
            Command::Quit => return false,
        }
        true
    }

    fn print_page(&self, filter: &SlotFilter, page: usize) {
        let page = paginate(&self.last_find, page, PAGE_SIZE);
        if page.total == 0 && filter.container != ContainerKind::Unknown {
            println!("{} is not loaded yet", filter.container);
            return;
        }

        println!(
            "page {}/{} ({} slots)",
            page.page + 1,
            page.page_count.max(1),
            page.total
        );
        for key in &page.items {
            match self.inventory.get(key) {
                Some(record) => println!(
                    "  {:<16} {} x{} [{:?} {:?}]",
                    key.to_string(),
                    record.name,
                    record.count,
                    record.quality,
                    record.category
                ),
                None => println!("  {:<16} -", key.to_string()),
            }
        }
    }

    fn print_status(&self) {
        println!(
            "connected: {}, pending requests: {}",
            self.connected,
            self.inventory.pending_count()
        );
        for container in ContainerKind::ALL {
            let bounds = self.inventory.store().bounds(container);
            println!(
                "  {:<10} size {:?}, occupied {}, loaded {}",
                container.to_string(),
                bounds.max_size,
                self.inventory.store().occupied_count(container),
                bounds.fully_loaded
            );
        }
    }

    fn log_event(&self, event: SlotEvent) {
        match event {
            SlotEvent::SlotChanged(key) => match self.inventory.get(&key) {
                Some(record) => debug!("{} -> {}", key, record.name),
                None => debug!("{} -> empty", key),
            },
            SlotEvent::BatchChanged(keys) => debug!("Batch of {} slots merged", keys.len()),
        }
    }

    pub async fn run(&mut self) -> Result<(), ClientError> {
        self.connect().await?;

        let mut sweep_interval = interval(Duration::from_secs(1));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Dropping malformed packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                Some(request) = self.outbound.recv(), if self.connected => {
                    if let Err(e) = self.send_packet(&Packet::Request(request)).await {
                        error!("Error sending request: {}", e);
                    }
                },

                Some(event) = self.events.recv() => {
                    self.log_event(event);
                },

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => match parse_command(&line) {
                            Ok(command) => {
                                if !self.handle_command(command) {
                                    break;
                                }
                            }
                            Err(e) => println!("{}", e),
                        },
                        Ok(None) => break,
                        Err(e) => {
                            error!("Error reading stdin: {}", e);
                            break;
                        }
                    }
                },

                _ = sweep_interval.tick() => {
                    let expired = self.inventory.expire_pending(Instant::now());
                    if !expired.is_empty() {
                        info!("Settled {} unanswered requests", expired.len());
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Category, ItemRecord, Quality, Response};

    async fn offline_client() -> Client {
        Client::new("127.0.0.1:9", 0, SyncConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_server_address() {
        let result = Client::new("not-an-address", 0, SyncConfig::default()).await;
        assert!(matches!(result, Err(ClientError::Address(_))));
    }

    #[tokio::test]
    async fn test_connected_packet_starts_preload() {
        let mut client = offline_client().await;

        client.handle_packet(Packet::Connected { client_id: 7 });

        assert!(client.connected);
        assert_eq!(client.client_id, Some(7));
        let mut requested = Vec::new();
        while let Ok(request) = client.outbound.try_recv() {
            requested.push(request);
        }
        assert_eq!(requested.len(), ContainerKind::ALL.len());
    }

    #[tokio::test]
    async fn test_response_packet_reaches_inventory() {
        let mut client = offline_client().await;
        client.handle_packet(Packet::Connected { client_id: 1 });

        let key = SlotKey::new(ContainerKind::Inventory, 2);
        client.handle_packet(Packet::Response(Response::Batch {
            container: ContainerKind::Inventory,
            start: 0,
            end: 100,
            max_size: Some(20),
            max_occupied_slot: Some(2),
            records: vec![(
                key,
                ItemRecord::new(11, "Copper Ore", Quality::Common, Category::Material),
            )],
        }));

        assert_eq!(client.inventory().get(&key).map(|r| r.instance_id), Some(11));
        assert!(client.inventory().is_fully_loaded(ContainerKind::Inventory));
    }

    #[tokio::test]
    async fn test_disconnect_packet() {
        let mut client = offline_client().await;
        client.handle_packet(Packet::Connected { client_id: 1 });
        client.handle_packet(Packet::Disconnected {
            reason: "Server full".to_string(),
        });

        assert!(!client.connected);
        assert_eq!(client.client_id, None);
    }

    #[tokio::test]
    async fn test_quit_command() {
        let mut client = offline_client().await;
        assert!(client.handle_command(Command::Status));
        assert!(!client.handle_command(Command::Quit));
    }
}
