//! Resource quotas
//!
//! A thread owns a LIFO stack of quota frames, one per bounded call.
//! Every charge updates every active frame; a violation is attributed to
//! the innermost frame whose limit broke, so the boundary that installed
//! that frame can recognize its own signal by level.

use std::fmt;

use crate::error::{RtError, RtResult};

/// Memory charged per table construction
pub const MEM_TABLE: u64 = 48;
/// Memory charged per table entry written
pub const MEM_TABLE_ENTRY: u64 = 16;
/// Memory charged per closure construction
pub const MEM_CLOSURE: u64 = 32;
/// Memory charged per continuation frame, plus this much per register
pub const MEM_CONT: u64 = 64;
/// Memory charged per continuation register slot
pub const MEM_REGISTER: u64 = 8;

/// Which budget a violation broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    /// CPU budget (instructions executed)
    Cpu,
    /// Memory budget (allocation units)
    Memory,
}

impl fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaKind::Cpu => write!(f, "cpu"),
            QuotaKind::Memory => write!(f, "memory"),
        }
    }
}

/// One budget frame
#[derive(Debug, Clone, Default)]
pub struct QuotaFrame {
    /// CPU limit, unlimited when absent
    pub cpu_limit: Option<u64>,
    /// CPU units consumed while this frame was active
    pub cpu_used: u64,
    /// Memory limit, unlimited when absent
    pub mem_limit: Option<u64>,
    /// Memory units consumed while this frame was active
    pub mem_used: u64,
    /// Whether this frame permits I/O
    pub io_enabled: bool,
}

impl QuotaFrame {
    /// An unrestricted frame
    pub fn unlimited() -> Self {
        Self {
            io_enabled: true,
            ..Self::default()
        }
    }
}

/// Usage introspection for one frame, reported by the call context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    /// CPU consumed under the frame
    pub cpu_used: u64,
    /// CPU limit the frame was installed with
    pub cpu_limit: Option<u64>,
    /// Memory consumed under the frame
    pub mem_used: u64,
    /// Memory limit the frame was installed with
    pub mem_limit: Option<u64>,
    /// Whether the frame was killed by exceeding a budget
    pub killed: bool,
}

impl ContextSnapshot {
    fn of(frame: &QuotaFrame, killed: bool) -> Self {
        Self {
            cpu_used: frame.cpu_used,
            cpu_limit: frame.cpu_limit,
            mem_used: frame.mem_used,
            mem_limit: frame.mem_limit,
            killed,
        }
    }
}

/// The per-thread stack of budget frames
#[derive(Debug)]
pub struct QuotaStack {
    frames: Vec<QuotaFrame>,
}

impl QuotaStack {
    /// A stack holding only the unrestricted base frame
    pub fn new() -> Self {
        Self {
            frames: vec![QuotaFrame::unlimited()],
        }
    }

    /// Push a frame, returning its level
    pub fn push(&mut self, frame: QuotaFrame) -> usize {
        self.frames.push(frame);
        self.frames.len() - 1
    }

    /// Pop the innermost frame.
    ///
    /// # Panics
    ///
    /// Panics when only the base frame is left; push/pop pairing is an
    /// engine invariant.
    pub fn pop(&mut self) -> QuotaFrame {
        if self.frames.len() <= 1 {
            panic!("cannot pop the base quota frame");
        }
        self.frames.pop().expect("quota stack is never empty")
    }

    /// Number of active frames, including the base frame
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Charge CPU units against every active frame
    pub fn charge_cpu(&mut self, n: u64) -> RtResult<()> {
        let mut violated = None;
        for (level, frame) in self.frames.iter_mut().enumerate() {
            frame.cpu_used += n;
            if let Some(limit) = frame.cpu_limit
                && frame.cpu_used > limit
            {
                violated = Some(level);
            }
        }
        match violated {
            Some(level) => Err(RtError::QuotaExceeded {
                kind: QuotaKind::Cpu,
                level,
            }),
            None => Ok(()),
        }
    }

    /// Charge memory units against every active frame
    pub fn charge_mem(&mut self, n: u64) -> RtResult<()> {
        let mut violated = None;
        for (level, frame) in self.frames.iter_mut().enumerate() {
            frame.mem_used += n;
            if let Some(limit) = frame.mem_limit
                && frame.mem_used > limit
            {
                violated = Some(level);
            }
        }
        match violated {
            Some(level) => Err(RtError::QuotaExceeded {
                kind: QuotaKind::Memory,
                level,
            }),
            None => Ok(()),
        }
    }

    /// I/O is permitted only when every active frame permits it
    pub fn io_allowed(&self) -> bool {
        self.frames.iter().all(|f| f.io_enabled)
    }

    /// Snapshot the innermost frame for introspection
    pub fn snapshot(&self, killed: bool) -> ContextSnapshot {
        let frame = self.frames.last().expect("quota stack is never empty");
        ContextSnapshot::of(frame, killed)
    }
}

impl Default for QuotaStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_attributed_to_innermost_broken_frame() {
        let mut stack = QuotaStack::new();
        stack.push(QuotaFrame {
            cpu_limit: Some(100),
            io_enabled: true,
            ..QuotaFrame::default()
        });
        let inner = stack.push(QuotaFrame {
            cpu_limit: Some(10),
            io_enabled: true,
            ..QuotaFrame::default()
        });

        assert!(stack.charge_cpu(10).is_ok());
        match stack.charge_cpu(1) {
            Err(RtError::QuotaExceeded { kind, level }) => {
                assert_eq!(kind, QuotaKind::Cpu);
                assert_eq!(level, inner);
            }
            other => panic!("expected quota violation, got {other:?}"),
        }
    }

    #[test]
    fn test_outer_frame_violation_skips_intact_inner() {
        let mut stack = QuotaStack::new();
        let outer = stack.push(QuotaFrame {
            mem_limit: Some(10),
            io_enabled: true,
            ..QuotaFrame::default()
        });
        stack.charge_mem(8).unwrap();
        // A fresh inner frame with a roomy limit: only the outer breaks.
        stack.push(QuotaFrame {
            mem_limit: Some(1000),
            io_enabled: true,
            ..QuotaFrame::default()
        });
        match stack.charge_mem(5) {
            Err(RtError::QuotaExceeded { level, .. }) => assert_eq!(level, outer),
            other => panic!("expected quota violation, got {other:?}"),
        }
    }

    #[test]
    fn test_charges_accumulate_in_all_frames() {
        let mut stack = QuotaStack::new();
        stack.push(QuotaFrame::unlimited());
        stack.charge_cpu(3).unwrap();
        stack.charge_cpu(4).unwrap();
        let inner = stack.pop();
        assert_eq!(inner.cpu_used, 7);
        assert_eq!(stack.snapshot(false).cpu_used, 7);
    }

    #[test]
    fn test_io_is_a_conjunction() {
        let mut stack = QuotaStack::new();
        assert!(stack.io_allowed());
        stack.push(QuotaFrame {
            io_enabled: false,
            ..QuotaFrame::default()
        });
        assert!(!stack.io_allowed());
        stack.push(QuotaFrame::unlimited());
        assert!(!stack.io_allowed());
    }

    #[test]
    #[should_panic(expected = "base quota frame")]
    fn test_popping_base_frame_panics() {
        let mut stack = QuotaStack::new();
        stack.pop();
    }
}
