#![forbid(unsafe_code)]

//! Label column alignment.
//!
//! With a fixed form width `W` every label box is `W` wide and every control
//! is offset by `W`. With `auto`, the coordinator measures the labels of the
//! visible fields at each nesting depth of a form and offsets every control at
//! that depth by the widest one plus [`LABEL_PADDING`]; each label box keeps
//! its own measured width plus padding.
//!
//! The coordinator holds only the per-depth maxima. The form triggers a full
//! [`LabelWidthCoordinator::rescan`] after any change that can move them
//! (field added or removed, visibility or label changed) and applies it on the
//! next flush, so an auto offset always reflects a complete scan.
//!
//! Top-aligned labels and inline forms get no control offset at all.

use std::collections::BTreeMap;
use std::fmt;

use unicode_width::UnicodeWidthStr;

use crate::config::{LabelPosition, LabelWidth};

/// Space between a label and its control.
pub const LABEL_PADDING: f32 = 12.0;

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// Measures rendered label text in pixels.
pub trait LabelMeasurer {
    fn measure(&self, label: &str) -> f32;
}

/// Unicode display width times a fixed pixel size per column. Wide (CJK)
/// characters count as two columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayWidthMeasurer {
    pub px_per_column: f32,
}

impl Default for DisplayWidthMeasurer {
    fn default() -> Self {
        Self { px_per_column: 7.0 }
    }
}

impl LabelMeasurer for DisplayWidthMeasurer {
    fn measure(&self, label: &str) -> f32 {
        UnicodeWidthStr::width(label) as f32 * self.px_per_column
    }
}

impl<F: Fn(&str) -> f32> LabelMeasurer for F {
    fn measure(&self, label: &str) -> f32 {
        self(label)
    }
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Form-wide layout settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FormLayout {
    pub label_width: Option<LabelWidth>,
    pub label_position: LabelPosition,
    pub inline: bool,
}

impl FormLayout {
    fn has_offset(&self) -> bool {
        self.label_position != LabelPosition::Top && !self.inline
    }
}

/// One field as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelItem<'a> {
    pub label: Option<&'a str>,
    /// Number of enclosing fields within the same form.
    pub depth: usize,
    pub visible: bool,
    /// Field-level override of the form's width.
    pub label_width: Option<LabelWidth>,
}

/// Resolved geometry of one field, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabelLayout {
    /// Width of the label box; `None` leaves it to the renderer.
    pub label_width: Option<f32>,
    /// Left offset of the control; `None` means no offset is applied.
    pub content_offset: Option<f32>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Per-form cache of auto label widths.
#[derive(Default)]
pub struct LabelWidthCoordinator {
    widest: BTreeMap<usize, f32>,
    rescans: u64,
}

impl fmt::Debug for LabelWidthCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelWidthCoordinator")
            .field("widest", &self.widest)
            .field("rescans", &self.rescans)
            .finish()
    }
}

impl LabelWidthCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every depth's widest auto label from scratch.
    pub fn rescan<'a>(
        &mut self,
        form: &FormLayout,
        items: impl IntoIterator<Item = LabelItem<'a>>,
        measurer: &dyn LabelMeasurer,
    ) {
        self.widest.clear();
        for item in items {
            if !item.visible || item.label_width.or(form.label_width) != Some(LabelWidth::Auto) {
                continue;
            }
            let Some(label) = item.label else { continue };
            let width = measurer.measure(label);
            let widest = self.widest.entry(item.depth).or_insert(0.0);
            if width > *widest {
                *widest = width;
            }
        }
        self.rescans += 1;
        tracing::trace!(
            target: "yform::label_width",
            depths = self.widest.len(),
            rescans = self.rescans,
            "label widths rescanned"
        );
    }

    /// Shared control offset of the auto group at `depth`.
    #[must_use]
    pub fn auto_offset(&self, depth: usize) -> Option<f32> {
        self.widest.get(&depth).map(|w| w + LABEL_PADDING)
    }

    #[must_use]
    pub fn rescans(&self) -> u64 {
        self.rescans
    }

    /// Geometry of `item` under `form`, using the last rescan for auto widths.
    #[must_use]
    pub fn layout(
        &self,
        form: &FormLayout,
        item: &LabelItem<'_>,
        measurer: &dyn LabelMeasurer,
    ) -> LabelLayout {
        let effective = item.label_width.or(form.label_width);

        let own_box = || item.label.map(|l| measurer.measure(l) + LABEL_PADDING);
        let label_width = if form.label_position == LabelPosition::Top {
            None
        } else {
            match effective {
                Some(LabelWidth::Fixed(w)) => Some(w),
                Some(LabelWidth::Auto) => own_box(),
                None => None,
            }
        };

        let content_offset = if !form.has_offset() {
            None
        } else if item.label.is_none() && item.label_width.is_none() && item.depth > 0 {
            Some(0.0)
        } else {
            match effective {
                Some(LabelWidth::Fixed(w)) => Some(w),
                // A field that asks for auto inside a non-auto form sizes alone.
                Some(LabelWidth::Auto) if form.label_width != Some(LabelWidth::Auto) => own_box(),
                Some(LabelWidth::Auto) => self.auto_offset(item.depth),
                None => None,
            }
        };

        LabelLayout {
            label_width,
            content_offset,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
