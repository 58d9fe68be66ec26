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

//! Watcher bridge.

use notify::{Config, Event, EventKind, RecommendedWatcher, Watcher};
use virtfs::ChangeSink;

use crate::backend::{stat_path, to_virtual_path};

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Creates a watcher forwarding events into the given sink.
///
/// The watcher runs its own thread; events cross into the single-threaded
/// core as plain notifications. A watcher-level error degrades into a
/// wholesale change, which costs a cache refill but never serves stale
/// data.
pub(crate) fn spawn(sink: ChangeSink) -> notify::Result<RecommendedWatcher> {
    RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) => forward(&sink, event),
            Err(err) => {
                tracing::debug!("watcher error, flushing caches: {err}");
                sink.notify_wholesale();
            }
        },
        Config::default(),
    )
}

/// Forwards a single watcher event into the sink.
///
/// Only creations, modifications and removals are of interest; access
/// events and the catch-all kinds are dropped. The stat snapshot travels
/// with the notification when the target still exists, so the core can
/// dedupe echoes of its own mutations by modification time.
fn forward(sink: &ChangeSink, event: Event) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }
    for path in event.paths {
        let stat = stat_path(&path).ok();
        sink.notify(to_virtual_path(&path), stat);
    }
}
