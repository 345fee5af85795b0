//! Nested frame discovery for broadcasts.
//!
//! Starting from the page's own frames, each frame's document is searched
//! for further frames, level by level, up to a fixed depth. Descending into
//! a cross-origin frame fails; that branch ends there while the rest of the
//! scan continues. Frames are listed in document pre-order: a frame comes
//! right before the frames nested inside it.
//!
//! The registry is rebuilt on every broadcast trigger since frames come and
//! go at any time.

use crate::constants::LISTENER_LOG_TARGET as TARGET;
use crate::context::ParentContext;

/// A frame found by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFrame<F> {
    /// Host handle of the frame element.
    pub frame: F,
    /// 1 for frames embedded directly in the page, 2 for their children, …
    pub depth: usize,
}

/// Snapshot of the reachable frames for one broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRegistry<F> {
    /// Discovered frames in pre-order.
    pub frames: Vec<DiscoveredFrame<F>>,
    /// Frames whose document could not be searched.
    pub inaccessible: usize,
    /// Whether the depth bound cut the scan short.
    pub truncated: bool,
}

impl<F> Default for FrameRegistry<F> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            inaccessible: 0,
            truncated: false,
        }
    }
}

impl<F> FrameRegistry<F> {
    /// Number of discovered frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when no frame was found.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Deepest level reached.
    pub fn max_depth(&self) -> usize {
        self.frames.iter().map(|f| f.depth).max().unwrap_or(0)
    }

    /// Iterate over the frame handles.
    pub fn iter(&self) -> impl Iterator<Item = &F> {
        self.frames.iter().map(|f| &f.frame)
    }
}

/// Collect every frame reachable from the page, at most `max_depth` levels
/// deep.
pub fn discover_frames<C: ParentContext>(ctx: &C, max_depth: usize) -> FrameRegistry<C::Frame> {
    let mut registry = FrameRegistry::default();
    if max_depth == 0 {
        return registry;
    }
    collect(ctx, ctx.top_level_frames(), 1, max_depth, &mut registry);
    registry
}

fn collect<C: ParentContext>(
    ctx: &C,
    frames: Vec<C::Frame>,
    depth: usize,
    max_depth: usize,
    registry: &mut FrameRegistry<C::Frame>,
) {
    log::trace!(target: TARGET, "Depth {depth}: found {} direct frame(s)", frames.len());

    for (index, frame) in frames.into_iter().enumerate() {
        let nested = if depth < max_depth {
            match ctx.nested_frames(&frame) {
                Ok(nested) => nested,
                Err(e) => {
                    log::trace!(
                        target: TARGET,
                        "Depth {depth}: cannot search frame {index} ({e})"
                    );
                    registry.inaccessible += 1;
                    Vec::new()
                }
            }
        } else {
            // Only probe for children that would be dropped.
            if matches!(ctx.nested_frames(&frame), Ok(ref n) if !n.is_empty()) {
                if !registry.truncated {
                    log::debug!(target: TARGET, "Max discovery depth {max_depth} reached");
                }
                registry.truncated = true;
            }
            Vec::new()
        };

        registry.frames.push(DiscoveredFrame { frame, depth });
        if !nested.is_empty() {
            collect(ctx, nested, depth + 1, max_depth, registry);
        }
    }
}
