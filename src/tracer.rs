//! Resolution tracer
//!
//! Every in-flight resolution pushes a [`Frame`] describing what is being
//! resolved and on whose behalf. Errors capture a snapshot of the stack as a
//! [`Trace`] so that a failure deep inside autowiring can be read back as a
//! chain like `App -> UserService -> Database`.

use crate::Identifier;
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// One in-flight resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    requested: Identifier,
    requested_by: Option<Identifier>,
    parameter: Option<Arc<str>>,
}

impl Frame {
    /// The identifier being resolved.
    #[inline]
    pub fn requested(&self) -> &Identifier {
        &self.requested
    }

    /// The identifier whose resolution caused this one.
    #[inline]
    pub fn requested_by(&self) -> Option<&Identifier> {
        self.requested_by.as_ref()
    }

    /// Parameter of `requested_by` being satisfied, if any.
    #[inline]
    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }
}

/// Snapshot of the tracer stack, outermost resolution first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    frames: Vec<Frame>,
}

impl Trace {
    /// An empty trace (failures outside any resolution).
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Frames, outermost first.
    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The identifier the caller originally asked for.
    pub fn root(&self) -> Option<&Identifier> {
        self.frames.first().map(|f| &f.requested)
    }

    /// Multi-line rendering including parameter names.
    pub fn render_verbose(&self) -> String {
        let mut out = String::new();
        for (depth, frame) in self.frames.iter().enumerate() {
            if depth > 0 {
                out.push('\n');
            }
            out.push_str(&"  ".repeat(depth));
            out.push_str(frame.requested.name());
            if let (Some(by), Some(param)) = (&frame.requested_by, &frame.parameter) {
                out.push_str(&format!(" (parameter `{param}` of {by})"));
            }
        }
        out
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return f.write_str("<empty>");
        }
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            f.write_str(frame.requested.name())?;
        }
        Ok(())
    }
}

/// Per-handle stacks of in-flight resolutions, one per thread.
///
/// A resolution never suspends, so it starts and ends on one thread; keying
/// by thread keeps handles shared across threads from seeing each other's
/// frames.
pub(crate) struct Tracer {
    frames: DashMap<ThreadId, Vec<Frame>, RandomState>,
}

impl Tracer {
    pub(crate) fn new() -> Self {
        Self {
            frames: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Run `f` over the calling thread's frames.
    fn with_frames<R>(&self, f: impl FnOnce(&[Frame]) -> R) -> R {
        match self.frames.get(&thread::current().id()) {
            Some(frames) => f(frames.value()),
            None => f(&[]),
        }
    }

    /// Whether `id` is currently being resolved on this thread.
    pub(crate) fn contains(&self, id: &Identifier) -> bool {
        self.with_frames(|frames| frames.iter().any(|f| &f.requested == id))
    }

    /// Current stack as a trace.
    pub(crate) fn snapshot(&self) -> Trace {
        Trace {
            frames: self.with_frames(<[Frame]>::to_vec),
        }
    }

    /// Current stack extended with a frame that was refused.
    pub(crate) fn snapshot_with(&self, id: &Identifier, parameter: Option<&str>) -> Trace {
        let mut frames = self.with_frames(<[Frame]>::to_vec);
        let requested_by = frames.last().map(|f| f.requested.clone());
        frames.push(Frame {
            requested: id.clone(),
            requested_by,
            parameter: parameter.map(Arc::from),
        });
        Trace { frames }
    }

    pub(crate) fn depth(&self) -> usize {
        self.with_frames(<[Frame]>::len)
    }

    /// Push a frame unless `id` is already on this thread's stack.
    ///
    /// Returns the stack as it would look with the refused frame when a cycle is found.
    pub(crate) fn push(
        &self,
        id: &Identifier,
        parameter: Option<&str>,
    ) -> std::result::Result<FrameGuard<'_>, Trace> {
        let thread = thread::current().id();
        let mut frames = self.frames.entry(thread).or_default();
        let requested_by = frames.last().map(|f| f.requested.clone());
        let frame = Frame {
            requested: id.clone(),
            requested_by,
            parameter: parameter.map(Arc::from),
        };
        if frames.iter().any(|f| &f.requested == id) {
            let mut chain = frames.clone();
            chain.push(frame);
            return Err(Trace { frames: chain });
        }
        frames.push(frame);
        Ok(FrameGuard {
            tracer: self,
            thread,
        })
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pops its frame when dropped, on success and on error alike.
pub(crate) struct FrameGuard<'a> {
    tracer: &'a Tracer,
    thread: ThreadId,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let emptied = match self.tracer.frames.get_mut(&self.thread) {
            Some(mut frames) => {
                frames.pop();
                frames.is_empty()
            }
            None => false,
        };
        if emptied {
            self.tracer
                .frames
                .remove_if(&self.thread, |_, frames| frames.is_empty());
        }
    }
}
