//! Stroke-based waveform editing with undo/redo.
//!
//! ## Example
//!
//! ```rust
//! use fygen::WaveformEditor;
//!
//! let mut editor = WaveformEditor::new();
//! editor.begin_stroke();
//! editor.draw_line((0, -1.0), (100, 1.0))?;
//! editor.set_point(200, 5.0)?; // clamped to 1.0
//! editor.end_stroke();
//!
//! editor.undo();
//! assert_eq!(editor.buffer().get(200)?, 0.0);
//! # Ok::<(), fygen::Error>(())
//! ```

use log::debug;

use crate::error::{Error, Result};
use crate::protocol::encoder::EncodedPayload;
use crate::waveform::{
    EditHistory, PointEdit, SAMPLE_COUNT, Sample, Shape, StrokeEdit, WaveformBuffer,
    clamp_sample,
};

/// A waveform buffer together with its edit history.
#[derive(Debug, Clone, Default)]
pub struct WaveformEditor {
    buffer: WaveformBuffer,
    history: EditHistory,
    stroke: Option<StrokeEdit>,
    snap: Option<Sample>,
}

impl WaveformEditor {
    /// Editor over a flat waveform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Editor over an existing waveform, with empty history.
    pub fn from_buffer(buffer: WaveformBuffer) -> Self {
        Self {
            buffer,
            ..Self::default()
        }
    }

    /// Current waveform.
    pub fn buffer(&self) -> &WaveformBuffer {
        &self.buffer
    }

    /// Edit history.
    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    /// Copy of the current waveform, detached from further edits.
    pub fn snapshot(&self) -> WaveformBuffer {
        self.buffer.snapshot()
    }

    /// Encode the current waveform.
    pub fn encode(&self) -> EncodedPayload {
        self.buffer.encode()
    }

    /// Whether a stroke is open.
    pub fn in_stroke(&self) -> bool {
        self.stroke.is_some()
    }

    /// Open a stroke. An already open stroke is committed first.
    pub fn begin_stroke(&mut self) {
        self.end_stroke();
        self.stroke = Some(StrokeEdit::new());
    }

    /// Close the open stroke and record it.
    ///
    /// Returns `false` when nothing was recorded (no stroke open, or a stroke
    /// that changed no sample).
    pub fn end_stroke(&mut self) -> bool {
        match self.stroke.take() {
            Some(stroke) => {
                let points = stroke.len();
                let recorded = self.history.record(stroke);
                if recorded {
                    debug!("Recorded stroke of {points} point(s)");
                }
                recorded
            },
            None => false,
        }
    }

    /// Quantize vertical values to multiples of `step` while editing.
    pub fn snap_to_grid(&mut self, step: Sample) -> Result<()> {
        if !step.is_finite() || step <= 0.0 || step > 2.0 {
            return Err(Error::InvalidArgument(format!(
                "grid step {step} (expected 0 < step <= 2)"
            )));
        }
        self.snap = Some(step);
        Ok(())
    }

    /// Stop quantizing.
    pub fn clear_snap(&mut self) {
        self.snap = None;
    }

    /// Current grid step, if snapping.
    pub fn snap(&self) -> Option<Sample> {
        self.snap
    }

    fn quantize(&self, value: Sample) -> Sample {
        let value = match self.snap {
            Some(step) if value.is_finite() => (value / step).round() * step,
            _ => value,
        };
        clamp_sample(value)
    }

    /// Set one sample.
    ///
    /// The value is snapped (if enabled) and clamped. Outside an open stroke
    /// the change is recorded as a stroke of its own.
    pub fn set_point(&mut self, index: usize, value: Sample) -> Result<()> {
        if self.stroke.is_none() {
            self.begin_stroke();
            let result = self.write(index, value);
            self.end_stroke();
            return result;
        }
        self.write(index, value)
    }

    /// Set every sample on the straight segment between two points.
    pub fn draw_line(&mut self, from: (usize, Sample), to: (usize, Sample)) -> Result<()> {
        for index in [from.0, to.0] {
            self.buffer.get(index)?;
        }

        let implicit = self.stroke.is_none();
        if implicit {
            self.begin_stroke();
        }

        let ((x0, y0), (x1, y1)) = if from.0 <= to.0 { (from, to) } else { (to, from) };
        let span = (x1 - x0) as Sample;
        let mut result = Ok(());
        for index in x0..=x1 {
            let value = if span == 0.0 {
                y1
            } else {
                y0 + (y1 - y0) * ((index - x0) as Sample / span)
            };
            result = self.write(index, value);
            if result.is_err() {
                break;
            }
        }

        if implicit {
            self.end_stroke();
        }
        result
    }

    /// Replace the whole waveform as a single stroke.
    pub fn fill_with(&mut self, mut f: impl FnMut(usize) -> Sample) -> Result<()> {
        self.begin_stroke();
        let mut result = Ok(());
        for index in 0..SAMPLE_COUNT {
            result = self.write(index, f(index));
            if result.is_err() {
                break;
            }
        }
        self.end_stroke();
        result
    }

    /// Replace the whole waveform with a preset shape, as a single stroke.
    pub fn apply_shape(&mut self, shape: Shape) {
        self.begin_stroke();
        for index in 0..SAMPLE_COUNT {
            // Every index below SAMPLE_COUNT is valid
            let _ = self.write(index, shape.sample(index));
        }
        self.end_stroke();
    }

    fn write(&mut self, index: usize, value: Sample) -> Result<()> {
        let new = self.quantize(value);
        let old = self.buffer.set(index, new)?;
        if old.to_bits() != new.to_bits() {
            if let Some(stroke) = self.stroke.as_mut() {
                stroke.push(PointEdit { index, old, new });
            }
        }
        Ok(())
    }

    /// Revert the most recent stroke. An open stroke is committed first.
    pub fn undo(&mut self) -> bool {
        self.end_stroke();
        self.history.undo(&mut self.buffer)
    }

    /// Re-apply the most recently undone stroke.
    pub fn redo(&mut self) -> bool {
        self.end_stroke();
        self.history.redo(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_point_outside_stroke_is_undoable() {
        let mut editor = WaveformEditor::new();
        editor.set_point(3, 0.5).unwrap();
        assert_eq!(editor.history().undo_depth(), 1);
        assert!(editor.undo());
        assert_eq!(editor.buffer().get(3).unwrap(), 0.0);
    }

    #[test]
    fn test_set_point_clamps_and_rejects_bad_index() {
        let mut editor = WaveformEditor::new();
        editor.set_point(0, 5.0).unwrap();
        assert_eq!(editor.buffer().get(0).unwrap(), 1.0);
        assert!(matches!(
            editor.set_point(2048, 0.0),
            Err(Error::IndexOutOfRange { index: 2048, .. })
        ));
    }

    #[test]
    fn test_stroke_is_atomic() {
        let mut editor = WaveformEditor::new();
        editor.begin_stroke();
        for i in 0..10 {
            editor.set_point(i, 0.1 * i as f32).unwrap();
        }
        assert!(editor.end_stroke());
        assert_eq!(editor.history().undo_depth(), 1);

        editor.undo();
        assert_eq!(*editor.buffer(), WaveformBuffer::new());
    }

    #[test]
    fn test_unchanged_stroke_is_not_recorded() {
        let mut editor = WaveformEditor::new();
        editor.begin_stroke();
        editor.set_point(5, 0.0).unwrap();
        assert!(!editor.end_stroke());
        assert!(!editor.history().can_undo());
        assert!(!editor.end_stroke());
    }

    #[test]
    fn test_n_undos_restore_initial_state() {
        let initial = WaveformBuffer::from_fn(|i| (i as f32 / 2048.0) - 0.5);
        let mut editor = WaveformEditor::from_buffer(initial.clone());

        for n in 0..5 {
            editor.begin_stroke();
            editor
                .draw_line((n * 100, -0.8), (n * 100 + 400, 0.3 * n as f32))
                .unwrap();
            editor.end_stroke();
        }
        for _ in 0..5 {
            assert!(editor.undo());
        }
        assert_eq!(*editor.buffer(), initial);
        assert!(!editor.undo());
    }

    #[test]
    fn test_redo_restores_pre_undo_state() {
        let mut editor = WaveformEditor::new();
        editor.draw_line((0, 1.0), (50, -1.0)).unwrap();
        editor.draw_line((25, 0.5), (75, 0.5)).unwrap();
        let before_undo = editor.snapshot();

        editor.undo();
        assert!(editor.redo());
        assert_eq!(*editor.buffer(), before_undo);
    }

    #[test]
    fn test_stroke_after_undo_clears_redo() {
        let mut editor = WaveformEditor::new();
        editor.set_point(1, 0.1).unwrap();
        editor.set_point(2, 0.2).unwrap();
        editor.undo();
        editor.undo();
        editor.set_point(9, -0.9).unwrap();

        let before = editor.snapshot();
        assert!(!editor.redo());
        assert_eq!(*editor.buffer(), before);
    }

    #[test]
    fn test_draw_line_interpolates_in_either_direction() {
        let mut editor = WaveformEditor::new();
        editor.draw_line((10, 1.0), (0, -1.0)).unwrap();
        assert_eq!(editor.buffer().get(0).unwrap(), -1.0);
        assert!((editor.buffer().get(5).unwrap()).abs() < 1e-6);
        assert_eq!(editor.buffer().get(10).unwrap(), 1.0);

        editor.draw_line((20, 0.4), (20, 0.6)).unwrap();
        assert!((editor.buffer().get(20).unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_draw_line_checks_indices_before_writing() {
        let mut editor = WaveformEditor::new();
        assert!(editor.draw_line((2000, 1.0), (3000, 1.0)).is_err());
        assert_eq!(*editor.buffer(), WaveformBuffer::new());
        assert!(!editor.history().can_undo());
    }

    #[test]
    fn test_snap_to_grid_quantizes_before_clamping() {
        let mut editor = WaveformEditor::new();
        editor.snap_to_grid(0.25).unwrap();
        editor.set_point(0, 0.3).unwrap();
        editor.set_point(1, 0.9).unwrap();
        editor.set_point(2, 1.2).unwrap();
        assert!((editor.buffer().get(0).unwrap() - 0.25).abs() < 1e-6);
        assert!((editor.buffer().get(1).unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(editor.buffer().get(2).unwrap(), 1.0);

        editor.clear_snap();
        editor.set_point(3, 0.3).unwrap();
        assert!((editor.buffer().get(3).unwrap() - 0.3).abs() < 1e-6);

        assert!(editor.snap_to_grid(0.0).is_err());
        assert!(editor.snap_to_grid(f32::NAN).is_err());
    }

    #[test]
    fn test_undo_commits_open_stroke() {
        let mut editor = WaveformEditor::new();
        editor.begin_stroke();
        editor.set_point(4, 0.4).unwrap();
        assert!(editor.undo());
        assert!(!editor.in_stroke());
        assert_eq!(editor.buffer().get(4).unwrap(), 0.0);
    }

    #[test]
    fn test_fill_with_is_one_stroke() {
        let mut editor = WaveformEditor::new();
        editor.fill_with(|i| if i < 1024 { 1.0 } else { -1.0 }).unwrap();
        assert_eq!(editor.history().undo_depth(), 1);
        editor.undo();
        assert_eq!(*editor.buffer(), WaveformBuffer::new());
    }
}
