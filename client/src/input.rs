//! Line commands typed at the client console

use crate::query::SlotFilter;
use shared::{Category, ContainerKind, Quality, SlotKey};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  swap <container> <index> <container> <index>   move/swap two slots
  drop <container> <index>                       discard an item
  find <container> [name] [quality=..] [category=..]
  page <n>                                       show a page of the last find
  status                                         pending requests and load state
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Swap { from: SlotKey, to: SlotKey },
    Drop(SlotKey),
    Find(SlotFilter),
    Page(usize),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown container '{0}'")]
    Container(String),
    #[error("invalid slot index '{0}'")]
    Index(String),
    #[error("invalid filter '{0}'")]
    Filter(String),
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(CommandError::Empty);
    };
    let args: Vec<&str> = words.collect();

    match verb.to_ascii_lowercase().as_str() {
        "swap" | "move" => match args.as_slice() {
            [c1, i1, c2, i2] => Ok(Command::Swap {
                from: parse_key(c1, i1)?,
                to: parse_key(c2, i2)?,
            }),
            _ => Err(CommandError::Usage(
                "swap <container> <index> <container> <index>",
            )),
        },
        "drop" => match args.as_slice() {
            [container, index] => Ok(Command::Drop(parse_key(container, index)?)),
            _ => Err(CommandError::Usage("drop <container> <index>")),
        },
        "find" => {
            let Some((container, filters)) = args.split_first() else {
                return Err(CommandError::Usage(
                    "find <container> [name] [quality=..] [category=..]",
                ));
            };
            parse_filter(container, filters).map(Command::Find)
        }
        "page" => match args.as_slice() {
            [n] => n
                .parse()
                .map(Command::Page)
                .map_err(|_| CommandError::Usage("page <n>")),
            _ => Err(CommandError::Usage("page <n>")),
        },
        "status" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn parse_container(name: &str) -> Result<ContainerKind, CommandError> {
    ContainerKind::parse(name).ok_or_else(|| CommandError::Container(name.to_string()))
}

fn parse_key(container: &str, index: &str) -> Result<SlotKey, CommandError> {
    let container = parse_container(container)?;
    let index = index
        .parse()
        .map_err(|_| CommandError::Index(index.to_string()))?;
    Ok(SlotKey::new(container, index))
}

fn parse_filter(container: &str, filters: &[&str]) -> Result<SlotFilter, CommandError> {
    let mut filter = SlotFilter::all(parse_container(container)?);

    for word in filters {
        match word.split_once('=') {
            Some(("quality", value)) => {
                let quality =
                    Quality::parse(value).ok_or_else(|| CommandError::Filter(word.to_string()))?;
                filter = filter.with_quality(quality);
            }
            Some(("category", value)) => {
                let category =
                    Category::parse(value).ok_or_else(|| CommandError::Filter(word.to_string()))?;
                filter = filter.with_category(category);
            }
            Some(("name", value)) => filter = filter.with_name(value),
            Some(_) => return Err(CommandError::Filter(word.to_string())),
            None => filter = filter.with_name(*word),
        }
    }

    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_swap() {
        assert_eq!(
            parse_command("swap inv 0 eq 2"),
            Ok(Command::Swap {
                from: SlotKey::new(ContainerKind::Inventory, 0),
                to: SlotKey::new(ContainerKind::Equipment, 2),
            })
        );
        assert!(matches!(
            parse_command("swap inv 0"),
            Err(CommandError::Usage(_))
        ));
        assert_eq!(
            parse_command("swap inv -1 inv 2"),
            Err(CommandError::Index("-1".to_string()))
        );
    }

    #[test]
    fn test_parse_drop() {
        assert_eq!(
            parse_command("drop bar 4"),
            Ok(Command::Drop(SlotKey::new(ContainerKind::QuickBar, 4)))
        );
        assert_eq!(
            parse_command("drop bag 4"),
            Err(CommandError::Container("bag".to_string()))
        );
    }

    #[test]
    fn test_parse_find() {
        let expected = SlotFilter::all(ContainerKind::Inventory)
            .with_name("Sword")
            .with_quality(Quality::Rare)
            .with_category(Category::Weapon);
        assert_eq!(
            parse_command("find inv Sword quality=rare category=weapon"),
            Ok(Command::Find(expected))
        );
        assert_eq!(
            parse_command("find inventory"),
            Ok(Command::Find(SlotFilter::all(ContainerKind::Inventory)))
        );
        assert_eq!(
            parse_command("find inv colour=red"),
            Err(CommandError::Filter("colour=red".to_string()))
        );
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_command("page 2"), Ok(Command::Page(2)));
        assert_eq!(parse_command("  STATUS "), Ok(Command::Status));
        assert_eq!(parse_command("exit"), Ok(Command::Quit));
        assert_eq!(parse_command(""), Err(CommandError::Empty));
        assert_eq!(
            parse_command("dance"),
            Err(CommandError::Unknown("dance".to_string()))
        );
    }
}
