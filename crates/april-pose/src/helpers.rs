//! Small utilities used around the processor.

use std::collections::{HashMap, VecDeque};

use crate::core::Marker;

/// Expand groups of marker ids sharing a size into a per-id size map.
///
/// Sizes are given in millimeters and returned in meters, ready for
/// [`TagSizes::PerId`](crate::TagSizes::PerId). Later groups override
/// earlier ones for repeated ids.
pub fn generate_marker_size_mapping<I, R>(groups: I) -> HashMap<u32, f64>
where
    I: IntoIterator<Item = (R, u32)>,
    R: IntoIterator<Item = u32>,
{
    let mut sizes = HashMap::new();
    for (ids, size_mm) in groups {
        let meters = f64::from(size_mm) / 1000.0;
        for id in ids {
            sizes.insert(id, meters);
        }
    }
    sizes
}

/// Text scale factor that keeps an id label proportional to the marker's
/// size in the image. Based on the longer of the two corner diagonals.
pub fn normalise_marker_text(marker: &Marker) -> f64 {
    let c = marker.pixel_corners();
    c[0].distance_to(&c[2]).max(c[1].distance_to(&c[3])) / 300.0
}

/// Mean of the last `points` samples.
#[derive(Clone, Debug)]
pub struct RollingAverage {
    data: VecDeque<f64>,
    points: usize,
}

impl RollingAverage {
    pub fn new(points: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(points),
            points,
        }
    }

    /// Add a sample, dropping the oldest once the window is full.
    pub fn new_data(&mut self, value: f64) {
        if self.points == 0 {
            return;
        }
        if self.data.len() == self.points {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    /// `None` until a sample has been added.
    pub fn average(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.iter().sum::<f64>() / self.data.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
