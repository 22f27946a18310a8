/// Detection summaries returned alongside raw detections
///
/// - [`organize_by_class`]: groups powdery detections under `T<cls>` keys
/// - [`count_grades`]: counts downy detections per grade under `<cls>级` keys

use crate::detector::Detection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Compact detection entry for class listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub id: usize,

    /// Always `"omit"`; coordinates are left out of summaries
    pub xyxy: String,

    /// Confidence formatted to two decimals
    pub conf: String,

    pub cls: u32,
}

/// Groups detections by class
///
/// # Example
///
/// ```
/// use mildew_engine::detector::Detection;
/// use mildew_engine::summary::organize_by_class;
///
/// let mut d = Detection::new([0.0, 0.0, 5.0, 5.0], 0.876, 2);
/// d.id = 1;
/// let grouped = organize_by_class(&[d]);
/// assert_eq!(grouped["T2"][0].conf, "0.88");
/// ```
pub fn organize_by_class(detections: &[Detection]) -> BTreeMap<String, Vec<SummaryItem>> {
    let mut grouped: BTreeMap<String, Vec<SummaryItem>> = BTreeMap::new();
    for d in detections {
        grouped.entry(format!("T{}", d.cls)).or_default().push(SummaryItem {
            id: d.id,
            xyxy: "omit".to_string(),
            conf: format!("{:.2}", d.conf),
            cls: d.cls,
        });
    }
    grouped
}

/// Counts detections per grade
pub fn count_grades(detections: &[Detection]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for d in detections {
        *counts.entry(format!("{}级", d.cls)).or_insert(0) += 1;
    }
    counts
}
