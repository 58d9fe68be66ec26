// Copyright (c) 2026 Virtfs contributors

// SPDX-License-Identifier: MIT
// All contributions are certified under the DCO

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NON-INFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

// ----------------------------------------------------------------------------

//! Change events.

use std::fmt;

use crate::entry::Entry;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Change event.
///
/// Reports that an entry, or the file system as a whole, may have changed.
/// A `None` entry denotes a wholesale change: arbitrary parts of the file
/// system may differ and every cache has been invalidated. For directory
/// changes, `added` and `removed` carry the precise diff of the listing when
/// one could be computed.
#[derive(Debug)]
pub struct ChangeEvent {
    /// Changed entry, or `None` for a wholesale change.
    pub entry: Option<Entry>,
    /// Entries that appeared in a directory listing.
    pub added: Option<Vec<Entry>>,
    /// Entries that disappeared from a directory listing.
    pub removed: Option<Vec<Entry>>,
}

// ----------------------------------------------------------------------------

/// Handler registration.
///
/// Returned on registration and passed back to unregister the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerId(u64);

// ----------------------------------------------------------------------------

/// Observer registry.
///
/// A small owned registry rather than an ambient event library: handlers
/// are invoked synchronously at fire time, in registration order. Handlers
/// must not mutate the file system - mutation from inside an observer would
/// run within the very bracketing the event reports on.
#[derive(Default)]
pub(crate) struct Observers {
    /// Change handlers.
    change: Vec<(HandlerId, Box<dyn Fn(&ChangeEvent)>)>,
    /// Rename handlers.
    rename: Vec<(HandlerId, Box<dyn Fn(&str, &str)>)>,
    /// Next handler registration.
    next: u64,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl ChangeEvent {
    /// Creates a wholesale change event.
    pub(crate) fn wholesale() -> Self {
        Self { entry: None, added: None, removed: None }
    }

    /// Creates a change event for a single entry.
    pub(crate) fn single(entry: Entry) -> Self {
        Self { entry: Some(entry), added: None, removed: None }
    }

    /// Creates a change event for a directory with its listing diff.
    pub(crate) fn directory(
        entry: Entry, added: Vec<Entry>, removed: Vec<Entry>,
    ) -> Self {
        Self {
            entry: Some(entry),
            added: Some(added),
            removed: Some(removed),
        }
    }
}

impl Observers {
    /// Registers a change handler.
    pub fn on_change<F>(&mut self, handler: F) -> HandlerId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        let id = self.next_id();
        self.change.push((id, Box::new(handler)));
        id
    }

    /// Unregisters a change handler, returning whether it was registered.
    pub fn off_change(&mut self, id: HandlerId) -> bool {
        let count = self.change.len();
        self.change.retain(|(check, _)| *check != id);
        self.change.len() != count
    }

    /// Registers a rename handler.
    pub fn on_rename<F>(&mut self, handler: F) -> HandlerId
    where
        F: Fn(&str, &str) + 'static,
    {
        let id = self.next_id();
        self.rename.push((id, Box::new(handler)));
        id
    }

    /// Unregisters a rename handler, returning whether it was registered.
    pub fn off_rename(&mut self, id: HandlerId) -> bool {
        let count = self.rename.len();
        self.rename.retain(|(check, _)| *check != id);
        self.rename.len() != count
    }

    /// Fires a change event to all handlers in registration order.
    pub fn fire_change(&self, event: &ChangeEvent) {
        for (_, handler) in &self.change {
            handler(event);
        }
    }

    /// Fires a rename event to all handlers in registration order.
    pub fn fire_rename(&self, old_path: &str, new_path: &str) {
        for (_, handler) in &self.rename {
            handler(old_path, new_path);
        }
    }

    /// Returns the next handler registration.
    fn next_id(&mut self) -> HandlerId {
        self.next += 1;
        HandlerId(self.next)
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl fmt::Debug for Observers {
    /// Formats the observer registry for debugging.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Observers")
            .field("change", &self.change.len())
            .field("rename", &self.rename.len())
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::default();
        for label in ["first", "second"] {
            let order = Rc::clone(&order);
            observers.on_change(move |_| order.borrow_mut().push(label));
        }

        observers.fire_change(&ChangeEvent::wholesale());
        assert_eq!(*order.borrow(), ["first", "second"]);
    }

    #[test]
    fn test_unregister() {
        let count = Rc::new(RefCell::new(0));
        let mut observers = Observers::default();
        let id = observers.on_change({
            let count = Rc::clone(&count);
            move |_| *count.borrow_mut() += 1
        });

        observers.fire_change(&ChangeEvent::wholesale());
        assert!(observers.off_change(id));
        assert!(!observers.off_change(id));

        observers.fire_change(&ChangeEvent::wholesale());
        assert_eq!(*count.borrow(), 1);
    }
}
