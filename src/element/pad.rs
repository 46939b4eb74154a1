//! Pad abstraction for node inputs and outputs.
//!
//! Pads are the connection points of nodes. An input pad carries the set of
//! formats it accepts; an output pad carries the format it advertises. Links
//! are stored as handle pairs ([`PadRef`]) rather than references, so the
//! graph can validate and tear them down deterministically.

use crate::format::FormatCaps;
use crate::pipeline::NodeId;
use std::fmt;

/// Direction of a pad (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// An input pad (receives frames from upstream).
    Input,
    /// An output pad (sends frames downstream).
    Output,
}

impl PadDirection {
    /// The direction a peer pad must have.
    pub fn opposite(&self) -> Self {
        match self {
            PadDirection::Input => PadDirection::Output,
            PadDirection::Output => PadDirection::Input,
        }
    }
}

/// Handle naming one pad of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PadRef {
    /// Owning node.
    pub node: NodeId,
    /// Pad direction.
    pub direction: PadDirection,
    /// Index among the node's pads of that direction.
    pub index: usize,
}

impl PadRef {
    /// Input pad `index` of `node`.
    pub fn input(node: NodeId, index: usize) -> Self {
        Self {
            node,
            direction: PadDirection::Input,
            index,
        }
    }

    /// Output pad `index` of `node`.
    pub fn output(node: NodeId, index: usize) -> Self {
        Self {
            node,
            direction: PadDirection::Output,
            index,
        }
    }
}

impl fmt::Display for PadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node {} {}",
            self.node.index(),
            pad_name(self.direction, self.index)
        )
    }
}

/// A pad instance on a node.
#[derive(Debug, Clone)]
pub struct Pad {
    direction: PadDirection,
    index: usize,
    caps: FormatCaps,
    peer: Option<PadRef>,
}

impl Pad {
    /// Create a new unlinked pad.
    pub fn new(direction: PadDirection, index: usize, caps: FormatCaps) -> Self {
        Self {
            direction,
            index,
            caps,
            peer: None,
        }
    }

    /// Create an input pad accepting `caps`.
    pub fn input(index: usize, caps: FormatCaps) -> Self {
        Self::new(PadDirection::Input, index, caps)
    }

    /// Create an output pad advertising `caps`.
    pub fn output(index: usize, caps: FormatCaps) -> Self {
        Self::new(PadDirection::Output, index, caps)
    }

    /// Pad name: `sink`/`src` for the first pad, `sink_N`/`src_N` after.
    pub fn name(&self) -> String {
        pad_name(self.direction, self.index)
    }

    /// Get the pad's direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// Index among the node's pads of this direction.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Check if this is an input pad.
    pub fn is_input(&self) -> bool {
        self.direction == PadDirection::Input
    }

    /// Check if this is an output pad.
    pub fn is_output(&self) -> bool {
        self.direction == PadDirection::Output
    }

    /// Accepted (input) or advertised (output) formats.
    pub fn caps(&self) -> &FormatCaps {
        &self.caps
    }

    pub(crate) fn set_caps(&mut self, caps: FormatCaps) {
        self.caps = caps;
    }

    /// The pad this one is linked to.
    pub fn peer(&self) -> Option<PadRef> {
        self.peer
    }

    /// Check if the pad is linked.
    pub fn is_linked(&self) -> bool {
        self.peer.is_some()
    }

    pub(crate) fn set_peer(&mut self, peer: PadRef) {
        debug_assert_eq!(peer.direction, self.direction.opposite());
        self.peer = Some(peer);
    }
}

fn pad_name(direction: PadDirection, index: usize) -> String {
    let base = match direction {
        PadDirection::Input => "sink",
        PadDirection::Output => "src",
    };
    if index == 0 {
        base.to_string()
    } else {
        format!("{base}_{index}")
    }
}
