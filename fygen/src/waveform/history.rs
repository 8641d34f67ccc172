//! Linear undo/redo history.
//!
//! Two stacks of strokes: applied and undone. Recording a new stroke clears
//! the undone stack, so there is never more than one redo branch.

use log::trace;

use crate::waveform::{Sample, WaveformBuffer};

/// One sample change: `(index, old, new)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointEdit {
    /// Sample index.
    pub index: usize,
    /// Value before the edit.
    pub old: Sample,
    /// Value after the edit.
    pub new: Sample,
}

/// Ordered sample changes from one continuous gesture; the unit of undo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrokeEdit {
    edits: Vec<PointEdit>,
}

impl StrokeEdit {
    /// An empty stroke.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change.
    pub fn push(&mut self, edit: PointEdit) {
        self.edits.push(edit);
    }

    /// Changes in the order they were made.
    pub fn edits(&self) -> &[PointEdit] {
        &self.edits
    }

    /// Number of recorded changes.
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Whether the stroke changed nothing.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Put back the old values, newest change first.
    pub fn revert(&self, buffer: &mut WaveformBuffer) {
        for edit in self.edits.iter().rev() {
            buffer.restore(edit.index, edit.old);
        }
    }

    /// Re-apply the new values in original order.
    pub fn reapply(&self, buffer: &mut WaveformBuffer) {
        for edit in &self.edits {
            buffer.restore(edit.index, edit.new);
        }
    }
}

/// Applied and undone strokes.
#[derive(Debug, Clone, Default)]
pub struct EditHistory {
    applied: Vec<StrokeEdit>,
    undone: Vec<StrokeEdit>,
}

impl EditHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished stroke. Empty strokes are ignored.
    ///
    /// Returns whether the stroke was recorded.
    pub fn record(&mut self, stroke: StrokeEdit) -> bool {
        if stroke.is_empty() {
            return false;
        }
        if !self.undone.is_empty() {
            trace!("New stroke discards {} undone stroke(s)", self.undone.len());
            self.undone.clear();
        }
        self.applied.push(stroke);
        true
    }

    /// Revert the most recent stroke. Returns `false` if there was none.
    pub fn undo(&mut self, buffer: &mut WaveformBuffer) -> bool {
        let Some(stroke) = self.applied.pop() else {
            return false;
        };
        stroke.revert(buffer);
        self.undone.push(stroke);
        true
    }

    /// Re-apply the most recently undone stroke. Returns `false` if there was none.
    pub fn redo(&mut self, buffer: &mut WaveformBuffer) -> bool {
        let Some(stroke) = self.undone.pop() else {
            return false;
        };
        stroke.reapply(buffer);
        self.applied.push(stroke);
        true
    }

    /// Whether [`Self::undo`] would do anything.
    pub fn can_undo(&self) -> bool {
        !self.applied.is_empty()
    }

    /// Whether [`Self::redo`] would do anything.
    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    /// Number of applied strokes.
    pub fn undo_depth(&self) -> usize {
        self.applied.len()
    }

    /// Number of undone strokes.
    pub fn redo_depth(&self) -> usize {
        self.undone.len()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.applied.clear();
        self.undone.clear();
    }
}
