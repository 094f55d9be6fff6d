use crate::{common::*, proposal_target::ProposalTargetInit};

/// The proposal-target layer configuration.
///
/// Optional fields fall back to the canonical training defaults; every
/// field is validated once when the init is built, never per batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The number of classes, background included.
    pub num_classes: i64,
    /// The per-image sample budget.
    pub rois_per_image: Option<i64>,
    /// The targeted fraction of foreground samples per image.
    pub fg_fraction: Option<f64>,
    /// The minimum overlap of a foreground sample.
    pub fg_thresh: Option<f64>,
    /// The lower bound of the background overlap band.
    pub bg_thresh_lo: Option<f64>,
    /// The upper bound of the background overlap band (exclusive).
    pub bg_thresh_hi: Option<f64>,
    /// Whether to normalize regression targets by the configured statistics.
    pub normalize_targets: Option<bool>,
    /// The per-coordinate regression target means.
    pub target_means: Option<[f64; 4]>,
    /// The per-coordinate regression target standard deviations.
    pub target_stds: Option<[f64; 4]>,
    /// The per-coordinate inside-weight constants.
    pub inside_weights: Option<[f64; 4]>,
}

impl Config {
    pub fn proposal_target_init(&self) -> ProposalTargetInit {
        let Self {
            num_classes,
            rois_per_image,
            fg_fraction,
            fg_thresh,
            bg_thresh_lo,
            bg_thresh_hi,
            normalize_targets,
            target_means,
            target_stds,
            inside_weights,
        } = *self;

        ProposalTargetInit {
            rois_per_image,
            fg_fraction,
            fg_thresh,
            bg_thresh_lo,
            bg_thresh_hi,
            normalize_targets,
            target_means,
            target_stds,
            inside_weights,
            ..ProposalTargetInit::default(num_classes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_builds_with_defaults() -> Result<()> {
        let config: Config = serde_json::from_str(r#"{ "num_classes": 21 }"#)?;
        config.proposal_target_init().build()?;
        Ok(())
    }

    #[test]
    fn config_round_trips_through_serde() -> Result<()> {
        let config = Config {
            num_classes: 21,
            rois_per_image: Some(64),
            fg_fraction: Some(0.5),
            fg_thresh: None,
            bg_thresh_lo: None,
            bg_thresh_hi: None,
            normalize_targets: Some(false),
            target_means: None,
            target_stds: Some([0.2, 0.2, 0.3, 0.3]),
            inside_weights: None,
        };

        let text = serde_json::to_string(&config)?;
        let parsed: Config = serde_json::from_str(&text)?;

        ensure!(parsed.num_classes == 21, "num_classes lost");
        ensure!(parsed.rois_per_image == Some(64), "rois_per_image lost");
        ensure!(parsed.target_stds == Some([0.2, 0.2, 0.3, 0.3]), "target_stds lost");
        parsed.proposal_target_init().build()?;
        Ok(())
    }

    #[test]
    fn degenerate_config_is_rejected_at_build_time() {
        let config: Config =
            serde_json::from_str(r#"{ "num_classes": 21, "fg_fraction": -0.25 }"#).unwrap();
        assert!(config.proposal_target_init().build().is_err());
    }
}
