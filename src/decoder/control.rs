// src/decoder/control.rs

/// Messages delivered from a render sink's thread to the control context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A scheduled buffer reached its end. `generation` identifies the
    /// schedule it belongs to so stale notifications can be dropped.
    RenderCompleted { generation: u64 },
}
