use std::str::FromStr;

use serde::Deserialize;

use crate::kernel::{EventMask, WatchFlags};

/// Event class names accepted in config files and on the command line.
///
/// `move` and `close` cover both halves; `all` requests every class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    Access,
    Attrib,
    CloseWrite,
    CloseNowrite,
    Close,
    Open,
    Modify,
    Create,
    Delete,
    DeleteSelf,
    MoveSelf,
    MovedFrom,
    MovedTo,
    Move,
    All,
}

impl EventClass {
    pub fn mask(self) -> EventMask {
        match self {
            EventClass::Access => EventMask::ACCESS,
            EventClass::Attrib => EventMask::ATTRIB,
            EventClass::CloseWrite => EventMask::CLOSE_WRITE,
            EventClass::CloseNowrite => EventMask::CLOSE_NOWRITE,
            EventClass::Close => EventMask::CLOSE,
            EventClass::Open => EventMask::OPEN,
            EventClass::Modify => EventMask::MODIFY,
            EventClass::Create => EventMask::CREATE,
            EventClass::Delete => EventMask::DELETE,
            EventClass::DeleteSelf => EventMask::DELETE_SELF,
            EventClass::MoveSelf => EventMask::MOVE_SELF,
            EventClass::MovedFrom => EventMask::MOVED_FROM,
            EventClass::MovedTo => EventMask::MOVED_TO,
            EventClass::Move => EventMask::MOVE,
            EventClass::All => EventMask::ALL_EVENTS,
        }
    }

    /// Union of the masks of `classes`; empty input means every class.
    pub fn combine(classes: &[EventClass]) -> EventMask {
        if classes.is_empty() {
            return EventMask::ALL_EVENTS;
        }
        classes
            .iter()
            .fold(EventMask::empty(), |acc, class| acc | class.mask())
    }
}

impl FromStr for EventClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "access" => Ok(EventClass::Access),
            "attrib" => Ok(EventClass::Attrib),
            "close_write" => Ok(EventClass::CloseWrite),
            "close_nowrite" => Ok(EventClass::CloseNowrite),
            "close" => Ok(EventClass::Close),
            "open" => Ok(EventClass::Open),
            "modify" => Ok(EventClass::Modify),
            "create" => Ok(EventClass::Create),
            "delete" => Ok(EventClass::Delete),
            "delete_self" => Ok(EventClass::DeleteSelf),
            "move_self" => Ok(EventClass::MoveSelf),
            "moved_from" => Ok(EventClass::MovedFrom),
            "moved_to" => Ok(EventClass::MovedTo),
            "move" => Ok(EventClass::Move),
            "all" => Ok(EventClass::All),
            other => Err(format!("invalid event class: {other}")),
        }
    }
}

/// Per-watch flag names accepted in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagName {
    OnlyDir,
    DontFollow,
    ExclUnlink,
    Oneshot,
    MaskAdd,
}

impl FlagName {
    pub fn flag(self) -> WatchFlags {
        match self {
            FlagName::OnlyDir => WatchFlags::ONLY_DIR,
            FlagName::DontFollow => WatchFlags::DONT_FOLLOW,
            FlagName::ExclUnlink => WatchFlags::EXCL_UNLINK,
            FlagName::Oneshot => WatchFlags::ONESHOT,
            FlagName::MaskAdd => WatchFlags::MASK_ADD,
        }
    }

    pub fn combine(names: &[FlagName]) -> WatchFlags {
        names
            .iter()
            .fold(WatchFlags::empty(), |acc, name| acc | name.flag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_class_parses_cli_spellings() {
        assert_eq!("Create".parse::<EventClass>(), Ok(EventClass::Create));
        assert_eq!("close-write".parse::<EventClass>(), Ok(EventClass::CloseWrite));
        assert!("explode".parse::<EventClass>().is_err());
    }

    #[test]
    fn combine_unions_masks() {
        let mask = EventClass::combine(&[EventClass::Create, EventClass::Move]);
        assert_eq!(
            mask,
            EventMask::CREATE | EventMask::MOVED_FROM | EventMask::MOVED_TO
        );
        assert_eq!(EventClass::combine(&[]), EventMask::ALL_EVENTS);
        assert_eq!(
            FlagName::combine(&[FlagName::OnlyDir, FlagName::DontFollow]),
            WatchFlags::ONLY_DIR | WatchFlags::DONT_FOLLOW
        );
    }
}
