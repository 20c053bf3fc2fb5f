//! Detection types and the per-pass aggregation derived from them.
//!
use serde::{Deserialize, Serialize};

/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One raw detection as returned by the model.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// The two classes this service counts.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PetClass {
    Cat,
    Dog,
}

impl PetClass {
    /// Case-insensitive exact label match. Must not match COCO's "hot dog".
    pub fn from_label(label: &str) -> Option<PetClass> {
        match label.trim().to_ascii_lowercase().as_str() {
            "cat" => Some(PetClass::Cat),
            "dog" => Some(PetClass::Dog),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PetClass::Cat => "cat",
            PetClass::Dog => "dog",
        }
    }
}

/// A detection retained by the class filter.
#[derive(Clone, Debug, PartialEq)]
pub struct PetDetection {
    pub class: PetClass,
    pub detection: Detection,
}

/// Keep only the detections labeled as cat or dog.
pub fn filter_pets(raw: Vec<Detection>) -> Vec<PetDetection> {
    raw.into_iter()
        .filter_map(|detection| {
            PetClass::from_label(&detection.label).map(|class| PetDetection { class, detection })
        })
        .collect()
}

/// Counts derived from the most recent detection pass.
///
/// Always rebuilt from scratch per pass, never accumulated across frames.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CounterState {
    pub cats: u32,
    pub dogs: u32,
    pub avg_confidence_percent: f32,
}

impl CounterState {
    pub fn from_pets(pets: &[PetDetection]) -> CounterState {
        let mut cats = 0;
        let mut dogs = 0;
        let mut confidence_sum = 0.0;

        for pet in pets {
            match pet.class {
                PetClass::Cat => cats += 1,
                PetClass::Dog => dogs += 1,
            }
            confidence_sum += pet.detection.confidence;
        }

        let avg_confidence_percent = match pets.is_empty() {
            true => 0.0,
            false => confidence_sum / pets.len() as f32 * 100.0,
        };

        CounterState {
            cats,
            dogs,
            avg_confidence_percent,
        }
    }

    pub fn total(&self) -> u32 {
        self.cats + self.dogs
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn detection(label: &str, confidence: f32) -> Detection {
        Detection {
            label: label.to_owned(),
            confidence,
            bbox: BoundingBox::new(10.0, 10.0, 50.0, 50.0),
        }
    }

    #[test]
    fn test_label_match_is_exact_and_case_insensitive() {
        assert_eq!(PetClass::from_label("cat"), Some(PetClass::Cat));
        assert_eq!(PetClass::from_label("Dog"), Some(PetClass::Dog));
        assert_eq!(PetClass::from_label(" CAT "), Some(PetClass::Cat));
        assert_eq!(PetClass::from_label("hot dog"), None);
        assert_eq!(PetClass::from_label("person"), None);
        assert_eq!(PetClass::from_label(""), None);
    }

    #[test]
    fn test_filter_keeps_only_pets() {
        let raw = vec![
            detection("dog", 0.92),
            detection("person", 0.99),
            detection("cat", 0.81),
            detection("hot dog", 0.88),
        ];

        let pets = filter_pets(raw);

        assert_eq!(pets.len(), 2);
        let counters = CounterState::from_pets(&pets);
        assert_eq!(counters.total(), pets.len() as u32);
        assert_eq!(counters.cats + counters.dogs, 2);
    }

    #[test]
    fn test_counters_for_one_dog_one_cat() {
        let pets = filter_pets(vec![detection("dog", 0.92), detection("cat", 0.81)]);
        let counters = CounterState::from_pets(&pets);

        assert_eq!(counters.cats, 1);
        assert_eq!(counters.dogs, 1);
        assert!((counters.avg_confidence_percent - 86.5).abs() < 0.01);
    }

    #[test]
    fn test_counters_zero_without_pets() {
        let pets = filter_pets(vec![detection("person", 0.99)]);
        let counters = CounterState::from_pets(&pets);

        assert_eq!(counters, CounterState::default());
        assert_eq!(counters.avg_confidence_percent, 0.0);
    }

    #[test]
    fn test_avg_confidence_stays_in_percent_range() {
        let pets = filter_pets(vec![
            detection("cat", 1.0),
            detection("dog", 1.0),
            detection("cat", 1.0),
        ]);
        let counters = CounterState::from_pets(&pets);

        assert!(counters.avg_confidence_percent <= 100.0);
        assert!(counters.avg_confidence_percent >= 0.0);
    }
}
