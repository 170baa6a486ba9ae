// src/watch/event.rs

use std::fmt;
use std::path::{Path, PathBuf};

/// High-level filesystem event published to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Accessed { path: PathBuf },
    AttributeChanged { path: PathBuf },
    ClosedAfterWrite { path: PathBuf },
    ClosedAfterRead { path: PathBuf },
    /// A new entry appeared.
    ///
    /// For a directory, its watch is installed asynchronously after this
    /// event. Anything created inside it before that watch lands produces
    /// no event of its own. Subdirectories present by then are still found
    /// and watched when the directory is walked, but files are not
    /// reported. Consumers that need every file should list a new
    /// directory themselves.
    Created { path: PathBuf, is_dir: bool },
    Deleted { path: PathBuf, is_dir: bool },
    Modified { path: PathBuf },
    Moved { from: PathBuf, to: PathBuf },
    Opened { path: PathBuf },
    Unmounted { path: PathBuf },
    /// The kernel dropped events; consumers should rescan.
    QueueOverflowed,
}

impl WatchEvent {
    /// The affected path; the destination for `Moved`.
    pub fn path(&self) -> Option<&Path> {
        match self {
            WatchEvent::Accessed { path }
            | WatchEvent::AttributeChanged { path }
            | WatchEvent::ClosedAfterWrite { path }
            | WatchEvent::ClosedAfterRead { path }
            | WatchEvent::Created { path, .. }
            | WatchEvent::Deleted { path, .. }
            | WatchEvent::Modified { path }
            | WatchEvent::Opened { path }
            | WatchEvent::Unmounted { path } => Some(path),
            WatchEvent::Moved { to, .. } => Some(to),
            WatchEvent::QueueOverflowed => None,
        }
    }

    /// Short lowercase label, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Accessed { .. } => "accessed",
            WatchEvent::AttributeChanged { .. } => "attribute-changed",
            WatchEvent::ClosedAfterWrite { .. } => "closed-write",
            WatchEvent::ClosedAfterRead { .. } => "closed-read",
            WatchEvent::Created { .. } => "created",
            WatchEvent::Deleted { .. } => "deleted",
            WatchEvent::Modified { .. } => "modified",
            WatchEvent::Moved { .. } => "moved",
            WatchEvent::Opened { .. } => "opened",
            WatchEvent::Unmounted { .. } => "unmounted",
            WatchEvent::QueueOverflowed => "queue-overflowed",
        }
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEvent::Moved { from, to } => {
                write!(f, "{} {} -> {}", self.kind(), from.display(), to.display())
            }
            WatchEvent::Created { path, is_dir: true } | WatchEvent::Deleted { path, is_dir: true } => {
                write!(f, "{} {}/", self.kind(), path.display())
            }
            WatchEvent::QueueOverflowed => f.write_str(self.kind()),
            other => match other.path() {
                Some(path) => write!(f, "{} {}", other.kind(), path.display()),
                None => f.write_str(other.kind()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_marks_directories_and_moves() {
        let created = WatchEvent::Created {
            path: PathBuf::from("/w/a"),
            is_dir: true,
        };
        assert_eq!(created.to_string(), "created /w/a/");

        let moved = WatchEvent::Moved {
            from: PathBuf::from("/w/f.txt"),
            to: PathBuf::from("/w/g.txt"),
        };
        assert_eq!(moved.to_string(), "moved /w/f.txt -> /w/g.txt");
        assert_eq!(moved.path(), Some(Path::new("/w/g.txt")));

        assert_eq!(WatchEvent::QueueOverflowed.to_string(), "queue-overflowed");
    }
}
