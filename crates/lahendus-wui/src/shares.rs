//! Progress bar widths for exercise completion.

use serde::{Deserialize, Serialize};

/// Smallest width a non-empty category is drawn with.
const MIN_SHARE: f64 = 0.01;

/// Portion of the overshoot taken back from the shares.
const BACK_CORRECTION: f64 = 0.97;

/// Extra width spread over the shares so rounded widths still fill the bar.
const ROUNDING_ALLOWANCE: f64 = 0.001;

/// Number of students per status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudentCounts {
    /// Grade at or above the threshold.
    pub completed: u32,
    /// Graded below the threshold.
    pub started: u32,
    /// Submitted but not graded.
    pub ungraded: u32,
    /// Nothing submitted.
    pub unstarted: u32,
}

impl StudentCounts {
    /// Total number of students.
    pub const fn total(&self) -> u32 {
        self.completed + self.started + self.ungraded + self.unstarted
    }
}

/// Fractions of the progress bar per status.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StudentShares {
    /// Width of the completed part.
    pub completed: f64,
    /// Width of the started part.
    pub started: f64,
    /// Width of the ungraded part.
    pub ungraded: f64,
    /// Width of the unstarted part.
    pub unstarted: f64,
}

impl StudentShares {
    /// Sum of all shares.
    pub fn sum(&self) -> f64 {
        self.completed + self.started + self.ungraded + self.unstarted
    }

    /// Returns `true` if there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.sum() == 0.0
    }
}

/// Computes progress bar widths.
///
/// Every non-empty category gets at least [`MIN_SHARE`] so it stays visible.
/// The resulting overshoot is taken back from all shares in proportion to
/// their size, and a small allowance is added so browser rounding does not
/// leave a gap. All-zero counts give all-zero shares.
pub fn calculate_student_shares(counts: StudentCounts) -> StudentShares {
    let total = counts.total();
    if total == 0 {
        return StudentShares::default();
    }

    let raw = [
        counts.completed,
        counts.started,
        counts.ungraded,
        counts.unstarted,
    ];
    let corrected: Vec<Option<f64>> = raw
        .iter()
        .map(|&count| (count > 0).then(|| (f64::from(count) / f64::from(total)).max(MIN_SHARE)))
        .collect();

    let present: Vec<f64> = corrected.iter().flatten().copied().collect();
    let over_correction = present.iter().sum::<f64>() - 1.0;
    #[allow(clippy::cast_precision_loss)]
    let allowance = ROUNDING_ALLOWANCE / present.len() as f64;

    let back_corrected: Vec<f64> = corrected
        .iter()
        .map(|share| {
            share.map_or(0.0, |share| {
                share - share * BACK_CORRECTION * over_correction + allowance
            })
        })
        .collect();

    StudentShares {
        completed: back_corrected[0],
        started: back_corrected[1],
        ungraded: back_corrected[2],
        unstarted: back_corrected[3],
    }
}
