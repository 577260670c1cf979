//! The tagged-union command surface a control thread sends to a listener
//! model between blocks. This is the contract the external-interfaces
//! section describes; nothing here parses a wire format, it is the shape a
//! host's OSC or plugin-parameter layer is expected to deserialize into.

use crate::math::Transform;
use crate::source::SourceId;

/// One imperative instruction a listener model applies the next time its
/// control-thread lock is available.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddSource { id: SourceId, transform: Transform },
    RemoveSource { id: SourceId },
    /// Discontinuous reposition: the source's convolution history is reset
    /// so no stale tail is audible across the jump.
    Move { id: SourceId, transform: Transform },
    /// Continuous reposition: convolution history carries over, letting
    /// Doppler and the HRTF's gradual change be heard across the update.
    Glide { id: SourceId, transform: Transform },
    SetBypass { id: SourceId, bypass: bool },
    SetListenerTransform { transform: Transform },
}

impl Command {
    /// The source a command concerns, if any (`SetListenerTransform` has
    /// none).
    pub fn source_id(&self) -> Option<SourceId> {
        match self {
            Command::AddSource { id, .. }
            | Command::RemoveSource { id }
            | Command::Move { id, .. }
            | Command::Glide { id, .. }
            | Command::SetBypass { id, .. } => Some(*id),
            Command::SetListenerTransform { .. } => None,
        }
    }

    /// Whether applying this command should reset convolution history for
    /// its source, per the `Move`/`Glide` distinction above.
    pub fn resets_history(&self) -> bool {
        matches!(self, Command::Move { .. } | Command::AddSource { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;

    #[test]
    fn glide_does_not_reset_history_but_move_does() {
        let t = Transform::at(Vector3::ZERO);
        assert!(!Command::Glide { id: 1, transform: t }.resets_history());
        assert!(Command::Move { id: 1, transform: t }.resets_history());
    }

    #[test]
    fn listener_transform_command_has_no_source() {
        let t = Transform::at(Vector3::ZERO);
        assert_eq!(Command::SetListenerTransform { transform: t }.source_id(), None);
    }
}
