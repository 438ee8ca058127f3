//! Developer trace lines ("level 6") with an optional per-thread capture.
//!
//! Every store round-trip emits one line through [`crate::dev6!`]. A [`Capture`] collects the
//! lines produced on its own thread, so tests can assert which commands reached the driver
//! (and that none did) without installing a global logger.

use std::cell::RefCell;
use std::marker::PhantomData;

/// Log target for developer lines; `logger` routes it to `dev6.log` on request.
pub const DEV_TARGET: &str = "docverb::dev6";

thread_local! {
    static CAPTURED: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Capture of the current thread's developer lines. Capturing stops when it is dropped.
#[must_use = "capturing stops as soon as the guard is dropped"]
pub struct Capture {
    // Tied to the thread whose lines it collects.
    _thread: PhantomData<*const ()>,
}

impl Capture {
    /// Start (or restart, discarding earlier lines) capturing on this thread.
    pub fn start() -> Self {
        CAPTURED.with(|c| *c.borrow_mut() = Some(Vec::new()));
        Self { _thread: PhantomData }
    }

    /// Lines captured so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        CAPTURED.with(|c| c.borrow().clone().unwrap_or_default())
    }

    /// Lines captured so far; the capture starts over empty.
    #[must_use]
    pub fn take(&self) -> Vec<String> {
        CAPTURED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
    }

    /// How many captured lines mention `needle`.
    #[must_use]
    pub fn count(&self, needle: &str) -> usize {
        CAPTURED.with(|c| {
            c.borrow()
                .as_ref()
                .map_or(0, |lines| lines.iter().filter(|l| l.contains(needle)).count())
        })
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        CAPTURED.with(|c| *c.borrow_mut() = None);
    }
}

/// Sink behind [`crate::dev6!`]: capture when active, then hand to the `log` facade.
#[doc(hidden)]
pub fn record(line: String) {
    log::trace!(target: DEV_TARGET, "{line}");
    CAPTURED.with(|c| {
        if let Some(lines) = c.borrow_mut().as_mut() {
            lines.push(line);
        }
    });
}

/// Emit one developer line.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {
        $crate::utils::devlog::record(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_sees_lines_until_taken() {
        let cap = Capture::start();
        crate::dev6!("dispatch {}", "distinct");
        crate::dev6!("insert");
        assert_eq!(cap.lines(), ["dispatch distinct", "insert"]);
        assert_eq!(cap.count("dispatch"), 1);
        assert_eq!(cap.take().len(), 2);
        assert!(cap.lines().is_empty());
    }

    #[test]
    fn other_threads_are_not_captured() {
        let cap = Capture::start();
        std::thread::spawn(|| crate::dev6!("elsewhere")).join().unwrap();
        crate::dev6!("here");
        assert_eq!(cap.lines(), ["here"]);
    }

    #[test]
    fn nothing_is_kept_after_drop() {
        drop(Capture::start());
        crate::dev6!("after");
        let cap = Capture::start();
        assert!(cap.lines().is_empty());
    }
}
