use crate::error::{CleanError, CleanResult};
use serde::{Deserialize, Serialize};

/// Which degree-2 collapse runs after snapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeType {
    Intersections,
    Collinear,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Endpoints closer than this collapse into one node. 0 disables.
    pub snap_threshold: f64,
    /// Split lines at shared and self-repeated vertices while loading.
    pub break_at_vertices: bool,
    pub merge_type: MergeType,
    /// Degrees away from straight a pass-through node may turn and still be
    /// merged by the collinear merge.
    pub collinear_threshold: f64,
    /// Douglas-Peucker tolerance, in map units. 0 keeps every vertex.
    pub angle_threshold: f64,
    pub fix_unlinks: bool,
    pub orphans: bool,
    pub get_unlinks: bool,
    /// Offset applied on both axes to a vertex sitting on a crossing.
    pub unlink_nudge: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            snap_threshold: 0.0,
            break_at_vertices: true,
            merge_type: MergeType::Intersections,
            collinear_threshold: 10.0,
            angle_threshold: 0.0,
            fix_unlinks: false,
            orphans: false,
            get_unlinks: false,
            unlink_nudge: 1.0,
        }
    }
}

impl CleaningConfig {
    pub fn validate(&self) -> CleanResult<()> {
        non_negative("snap_threshold", self.snap_threshold)?;
        non_negative("angle_threshold", self.angle_threshold)?;
        non_negative("collinear_threshold", self.collinear_threshold)?;
        if self.collinear_threshold > 180.0 {
            return Err(CleanError::InvalidConfig(format!(
                "collinear_threshold must be within 0..=180 degrees, got {}",
                self.collinear_threshold
            )));
        }
        non_negative("unlink_nudge", self.unlink_nudge)?;
        if self.fix_unlinks && self.unlink_nudge == 0.0 {
            return Err(CleanError::InvalidConfig(
                "unlink_nudge must be positive when fix_unlinks is set".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_negative(name: &str, value: f64) -> CleanResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CleanError::InvalidConfig(format!(
            "{} must be a finite, non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(CleaningConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: CleaningConfig =
            serde_json::from_str(r#"{"snap_threshold": 2.5, "merge_type": "collinear"}"#).unwrap();
        assert_eq!(cfg.snap_threshold, 2.5);
        assert_eq!(cfg.merge_type, MergeType::Collinear);
        assert_eq!(cfg.unlink_nudge, 1.0);
        assert!(!cfg.orphans);
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let cfg = CleaningConfig {
            snap_threshold: -1.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(CleanError::InvalidConfig(_))));

        let cfg = CleaningConfig {
            angle_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = CleaningConfig {
            collinear_threshold: 200.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
