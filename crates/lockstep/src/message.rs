//! src/message.rs
//!
//! Messages exchanged between the boss and its workers.
//!
//! The same channel carries every kind of message. Instead of the receiving loop
//! branching on the variant, each message hands itself to the matching callback
//! of a [`MessageHandler`]:
//!
//! ```text
//!   Status -> on_status(sender, status)
//!   Log    -> on_log(sender, level, text)
//!   Quit   -> on_quit(sender, exit_status)
//! ```
//!
//! The boss and the worker both implement [`MessageHandler`]; senders only need
//! the constructors on [`Message`].

use std::fmt;

use tracing::Level;

/// Identity of one worker slot, assigned when the pool is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>2}", self.0)
    }
}

impl From<u32> for WorkerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Originator of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    Boss,
    Worker(WorkerId),
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Boss => f.write_str("BOSS"),
            Peer::Worker(id) => write!(f, "{}", id),
        }
    }
}

/// Purpose of a status message.
///
/// Workers send `Ready` and `Complete`; the boss only ever sends `BeginTest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ready,
    Complete,
    BeginTest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Status {
        sender: Peer,
        status: Status,
    },
    Log {
        sender: Peer,
        level: Level,
        text: String,
    },
    /// Terminal message of a worker; `exit_status` is its error count.
    Quit { sender: Peer, exit_status: u32 },
}

/// Receiver side of the protocol.
pub trait MessageHandler {
    fn on_status(&mut self, sender: Peer, status: Status);
    fn on_log(&mut self, sender: Peer, level: Level, text: String);
    fn on_quit(&mut self, sender: Peer, exit_status: u32);
}

impl Message {
    pub fn status(sender: Peer, status: Status) -> Self {
        Message::Status { sender, status }
    }

    pub fn log(sender: Peer, level: Level, text: impl Into<String>) -> Self {
        Message::Log {
            sender,
            level,
            text: text.into(),
        }
    }

    pub fn quit(sender: Peer, exit_status: u32) -> Self {
        Message::Quit {
            sender,
            exit_status,
        }
    }

    pub fn sender(&self) -> Peer {
        match self {
            Message::Status { sender, .. }
            | Message::Log { sender, .. }
            | Message::Quit { sender, .. } => *sender,
        }
    }

    /// Dispatch this message to the callback matching its variant.
    pub fn handle<H>(self, receiver: &mut H)
    where
        H: MessageHandler + ?Sized,
    {
        match self {
            Message::Status { sender, status } => receiver.on_status(sender, status),
            Message::Log {
                sender,
                level,
                text,
            } => receiver.on_log(sender, level, text),
            Message::Quit {
                sender,
                exit_status,
            } => receiver.on_quit(sender, exit_status),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Status { sender, status } => write!(f, "Status({}, {:?})", sender, status),
            Message::Log {
                sender,
                level,
                text,
            } => write!(f, "Log({}, {}, {:?})", sender, level, text),
            Message::Quit {
                sender,
                exit_status,
            } => write!(f, "Quit({}, {})", sender, exit_status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl MessageHandler for Recorder {
        fn on_status(&mut self, sender: Peer, status: Status) {
            self.calls.push(format!("status {} {:?}", sender, status));
        }

        fn on_log(&mut self, sender: Peer, level: Level, text: String) {
            self.calls.push(format!("log {} {} {}", sender, level, text));
        }

        fn on_quit(&mut self, sender: Peer, exit_status: u32) {
            self.calls.push(format!("quit {} {}", sender, exit_status));
        }
    }

    #[test]
    fn test_handle_dispatches_each_variant_to_its_callback() {
        let worker = Peer::Worker(WorkerId(3));
        let mut recorder = Recorder::default();

        Message::status(worker, Status::Ready).handle(&mut recorder);
        Message::log(worker, Level::INFO, "run1").handle(&mut recorder);
        Message::quit(worker, 2).handle(&mut recorder);

        assert_eq!(
            recorder.calls,
            vec![
                "status  3 Ready".to_string(),
                "log  3 INFO run1".to_string(),
                "quit  3 2".to_string(),
            ]
        );
    }

    #[test]
    fn test_sender_is_reported_for_every_variant() {
        let boss = Peer::Boss;
        assert_eq!(Message::status(boss, Status::BeginTest).sender(), boss);
        assert_eq!(Message::log(boss, Level::WARN, "x").sender(), boss);
        assert_eq!(Message::quit(Peer::Worker(WorkerId(7)), 0).sender(), Peer::Worker(WorkerId(7)));
    }

    #[test]
    fn test_display_names_boss_sender() {
        let msg = Message::status(Peer::Boss, Status::BeginTest);
        assert_eq!(msg.to_string(), "Status(BOSS, BeginTest)");
    }
}
