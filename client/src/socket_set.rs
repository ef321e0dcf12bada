use std::fmt::{self, Debug, Formatter};

/**
Anything the [`SocketSet`] can drive: one tick of progress at a time, with
enough introspection to know when the socket is finished.

[`HttpConn`](crate::HttpConn) implements this.
*/
pub trait Pollable {
    /// Makes one tick of progress. Returns `true` if anything interesting
    /// happened.
    fn update(&mut self) -> bool;

    /// Whether a transport is currently open.
    fn is_open(&self) -> bool;

    /// Whether work remains that would reopen or continue using the
    /// transport.
    fn has_pending_work(&self) -> bool;

    /// Switches between blocking and non-blocking transports.
    fn set_nonblocking(&mut self, nonblocking: bool);
}

struct Entry {
    socket: Box<dyn Pollable>,
    delete_when_done: bool,
}

/**
A container that polls a group of sockets round-robin from one thread.

Members are switched to non-blocking mode when added, since a single
blocking member would stall the whole set. A member added with
`delete_when_done` is dropped from the set once it is closed with no
pending work.

```no_run
use minnow_client::{HttpConn, SocketSet};

let mut set = SocketSet::new();
let mut conn = HttpConn::new(());
conn.get("http://example.com/").unwrap();
set.add(conn);
while !set.is_empty() {
    set.update();
}
```
*/
#[derive(Default)]
pub struct SocketSet {
    sockets: Vec<Entry>,
}

impl Debug for SocketSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketSet")
            .field("sockets", &self.sockets.len())
            .finish()
    }
}

impl SocketSet {
    /// Builds an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a socket that is dropped from the set once it is finished.
    pub fn add(&mut self, socket: impl Pollable + 'static) {
        self.add_with(socket, true);
    }

    /// Adds a socket with an explicit removal policy. A socket added with
    /// `delete_when_done = false` stays in the set until
    /// [`clear`](SocketSet::clear).
    pub fn add_with(&mut self, socket: impl Pollable + 'static, delete_when_done: bool) {
        let mut socket = Box::new(socket);
        socket.set_nonblocking(true);
        self.sockets.push(Entry {
            socket,
            delete_when_done,
        });
    }

    /// Polls every member once, in insertion order, reclaiming finished
    /// members. Returns `true` if any member reported progress.
    pub fn update(&mut self) -> bool {
        let mut interesting = false;
        self.sockets.retain_mut(|entry| {
            interesting |= entry.socket.update();
            let finished = entry.delete_when_done
                && !entry.socket.is_open()
                && !entry.socket.has_pending_work();
            if finished {
                log::debug!("dropping finished socket from the set");
            }
            !finished
        });
        interesting
    }

    /// Number of sockets in the set.
    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Drops every member.
    pub fn clear(&mut self) {
        self.sockets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{Pollable, SocketSet};

    struct Countdown {
        ticks: usize,
    }

    impl Pollable for Countdown {
        fn update(&mut self) -> bool {
            self.ticks = self.ticks.saturating_sub(1);
            true
        }

        fn is_open(&self) -> bool {
            self.ticks > 0
        }

        fn has_pending_work(&self) -> bool {
            self.ticks > 0
        }

        fn set_nonblocking(&mut self, _nonblocking: bool) {}
    }

    #[test]
    fn finished_members_are_reclaimed() {
        let mut set = SocketSet::new();
        set.add(Countdown { ticks: 1 });
        set.add(Countdown { ticks: 3 });
        assert_eq!(set.len(), 2);

        assert!(set.update());
        assert_eq!(set.len(), 1);

        set.update();
        set.update();
        assert!(set.is_empty());
    }

    #[test]
    fn kept_members_survive_completion() {
        let mut set = SocketSet::new();
        set.add_with(Countdown { ticks: 1 }, false);
        set.update();
        set.update();
        assert_eq!(set.len(), 1);
        set.clear();
        assert!(set.is_empty());
    }
}
