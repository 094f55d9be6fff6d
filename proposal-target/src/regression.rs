//! Expands sampled proposal/ground-truth pairs into class-indexed
//! regression targets and loss-inclusion weights.

use crate::{common::*, sampling::SampledRois};

/// Encodes regression deltas into the sparse `4 * num_classes` layout.
///
/// The normalization and weight constants are resolved onto their device
/// once at construction and never mutated afterwards.
#[derive(Debug)]
pub struct TargetEncoder {
    pub(crate) num_classes: i64,
    pub(crate) normalize_targets: bool,
    pub(crate) target_means: Tensor,
    pub(crate) target_stds: Tensor,
    pub(crate) inside_weights: Tensor,
}

/// The class-expanded regression targets and their loss weights.
///
/// All three tensors share the shape `[batch, rois_per_image,
/// 4 * num_classes]`. A row labeled `c > 0` is non-zero only within slots
/// `[4c, 4c + 4)`; background and padding rows are entirely zero, which is
/// what makes the regression loss ignore them once the inside weights gate
/// it.
#[derive(Debug, TensorLike, Getters)]
pub struct RegressionTargets {
    #[get = "pub"]
    pub(crate) bbox_targets: Tensor,
    #[get = "pub"]
    pub(crate) bbox_inside_weights: Tensor,
    #[get = "pub"]
    pub(crate) bbox_outside_weights: Tensor,
}

impl TargetEncoder {
    pub fn encode(&self, sampled: &SampledRois) -> Result<RegressionTargets> {
        let rois = sampled.rois();
        let labels = sampled.labels();
        let (batch_size, rois_per_image, _) = rois.size3()?;
        let device = rois.device();
        ensure!(
            device == self.target_means.device(),
            "input device {:?} does not match the configured device {:?}",
            device,
            self.target_means.device()
        );

        let deltas = tch_boxes::encode_boxes(
            &rois.narrow(2, 1, 4),
            &sampled.gt_rois().narrow(2, 0, 4),
        )?;
        let deltas = if self.normalize_targets {
            (deltas - &self.target_means) / &self.target_stds
        } else {
            deltas
        };

        let bbox_targets = Tensor::zeros(
            &[batch_size, rois_per_image, 4 * self.num_classes],
            (rois.kind(), device),
        );
        let bbox_inside_weights = bbox_targets.zeros_like();

        for img in 0..batch_size {
            let img_labels = labels.select(0, img);
            let fg_inds = Vec::<i64>::from(img_labels.gt(0).nonzero().view([-1]));

            for ind in fg_inds {
                let class = i64::from(img_labels.select(0, ind));
                let start = 4 * class;
                let _ = bbox_targets
                    .select(0, img)
                    .select(0, ind)
                    .narrow(0, start, 4)
                    .copy_(&deltas.i((img, ind)));
                let _ = bbox_inside_weights
                    .select(0, img)
                    .select(0, ind)
                    .narrow(0, start, 4)
                    .copy_(&self.inside_weights);
            }
        }

        let bbox_outside_weights = bbox_inside_weights.gt(0.0).to_kind(bbox_targets.kind());

        Ok(RegressionTargets {
            bbox_targets,
            bbox_inside_weights,
            bbox_outside_weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(num_classes: i64, normalize_targets: bool) -> TargetEncoder {
        TargetEncoder {
            num_classes,
            normalize_targets,
            target_means: Tensor::of_slice(&[0.0f32; 4]),
            target_stds: Tensor::of_slice(&[0.1f32, 0.1, 0.2, 0.2]),
            inside_weights: Tensor::of_slice(&[1.0f32; 4]),
        }
    }

    fn sampled_fixture() -> SampledRois {
        // one foreground row of class 3, one background row, one padding row
        let rois = Tensor::of_slice(&[
            0.0f32, 12.0, 12.0, 52.0, 52.0, //
            0.0, 100.0, 100.0, 120.0, 120.0, //
            0.0, 0.0, 0.0, 0.0, 0.0,
        ])
        .view([1, 3, 5]);
        let labels = Tensor::of_slice(&[3i64, 0, 0]).view([1, 3]);
        let gt_rois = Tensor::of_slice(&[
            10.0f32, 10.0, 46.0, 44.0, 3.0, //
            10.0, 10.0, 46.0, 44.0, 3.0, //
            0.0, 0.0, 0.0, 0.0, 0.0,
        ])
        .view([1, 3, 5]);

        SampledRois {
            rois,
            labels,
            gt_rois,
        }
    }

    #[test]
    fn targets_occupy_only_the_assigned_class_slots() -> Result<()> {
        let sampled = sampled_fixture();
        let targets = encoder(5, false).encode(&sampled)?;

        let (batch, rois, entries) = targets.bbox_targets().size3()?;
        ensure!((batch, rois, entries) == (1, 3, 20), "shape {:?}", (batch, rois, entries));

        let fg_row = targets.bbox_targets().i((0, 0));
        ensure!(
            f64::from(fg_row.narrow(0, 12, 4).abs().min()) > 0.0,
            "class-3 slots must be populated"
        );
        ensure!(
            f64::from(fg_row.narrow(0, 0, 12).abs().sum(Kind::Float)) == 0.0
                && f64::from(fg_row.narrow(0, 16, 4).abs().sum(Kind::Float)) == 0.0,
            "other class slots must stay zero"
        );
        Ok(())
    }

    #[test]
    fn background_rows_are_entirely_zero() -> Result<()> {
        let sampled = sampled_fixture();
        let targets = encoder(5, true).encode(&sampled)?;

        for row in 1..3 {
            ensure!(
                f64::from(targets.bbox_targets().i((0, row)).abs().sum(Kind::Float)) == 0.0,
                "target row {} must be zero",
                row
            );
            ensure!(
                f64::from(targets.bbox_inside_weights().i((0, row)).abs().sum(Kind::Float)) == 0.0,
                "weight row {} must be zero",
                row
            );
        }
        Ok(())
    }

    #[test]
    fn inside_weights_mirror_the_target_slots() -> Result<()> {
        let sampled = sampled_fixture();
        let targets = encoder(5, true).encode(&sampled)?;

        let weight_row = targets.bbox_inside_weights().i((0, 0));
        let expect = {
            let row = Tensor::zeros(&[20], (Kind::Float, Device::Cpu));
            let _ = row.narrow(0, 12, 4).fill_(1.0);
            row
        };
        ensure!(
            bool::from(weight_row.eq_tensor(&expect).all()),
            "weights: {:?}",
            Vec::<f32>::from(weight_row)
        );
        Ok(())
    }

    #[test]
    fn outside_weights_flag_the_populated_slots() -> Result<()> {
        let sampled = sampled_fixture();
        let targets = encoder(5, true).encode(&sampled)?;

        let expect = targets.bbox_inside_weights().gt(0.0).to_kind(Kind::Float);
        ensure!(
            bool::from(targets.bbox_outside_weights().eq_tensor(&expect).all()),
            "outside weights must be the inside-weight mask"
        );
        Ok(())
    }

    #[test]
    fn normalization_divides_by_the_configured_stds() -> Result<()> {
        let sampled = sampled_fixture();

        let raw = encoder(5, false).encode(&sampled)?;
        let normalized = encoder(5, true).encode(&sampled)?;

        let raw_slot = raw.bbox_targets().i((0, 0)).narrow(0, 12, 4);
        let normalized_slot = normalized.bbox_targets().i((0, 0)).narrow(0, 12, 4);
        let stds = Tensor::of_slice(&[0.1f32, 0.1, 0.2, 0.2]);

        let max_error = f64::from((normalized_slot * stds - raw_slot).abs().max());
        approx::assert_abs_diff_eq!(max_error, 0.0, epsilon = 1e-6);
        Ok(())
    }
}
