//! The proposal-target layer: augments the proposal pool, assigns
//! proposals to ground truth, samples a fixed-size training batch and
//! encodes its regression targets.

use crate::{
    assignment::{assign_proposals, augment_proposals},
    common::*,
    regression::TargetEncoder,
    sampling::RoiSampler,
};

#[derive(Debug, Clone)]
pub struct ProposalTargetInit {
    pub num_classes: i64,
    pub rois_per_image: Option<i64>,
    pub fg_fraction: Option<f64>,
    pub fg_thresh: Option<f64>,
    pub bg_thresh_lo: Option<f64>,
    pub bg_thresh_hi: Option<f64>,
    pub normalize_targets: Option<bool>,
    pub target_means: Option<[f64; 4]>,
    pub target_stds: Option<[f64; 4]>,
    pub inside_weights: Option<[f64; 4]>,
    pub device: Device,
}

impl ProposalTargetInit {
    pub fn default(num_classes: i64) -> Self {
        Self {
            num_classes,
            rois_per_image: None,
            fg_fraction: None,
            fg_thresh: None,
            bg_thresh_lo: None,
            bg_thresh_hi: None,
            normalize_targets: None,
            target_means: None,
            target_stds: None,
            inside_weights: None,
            device: Device::Cpu,
        }
    }

    pub fn build(self) -> Result<ProposalTarget> {
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
            device,
        } = self;

        let rois_per_image = rois_per_image.unwrap_or(128);
        let fg_fraction = fg_fraction.unwrap_or(0.25);
        let fg_thresh = fg_thresh.unwrap_or(0.5);
        let bg_thresh_lo = bg_thresh_lo.unwrap_or(0.0);
        let bg_thresh_hi = bg_thresh_hi.unwrap_or(0.5);
        let normalize_targets = normalize_targets.unwrap_or(true);
        let target_means = target_means.unwrap_or([0.0, 0.0, 0.0, 0.0]);
        let target_stds = target_stds.unwrap_or([0.1, 0.1, 0.2, 0.2]);
        let inside_weights = inside_weights.unwrap_or([1.0, 1.0, 1.0, 1.0]);

        ensure!(
            num_classes >= 2,
            "num_classes must count background and at least one object class"
        );
        ensure!(rois_per_image > 0, "rois_per_image must be positive");
        ensure!(
            (0.0..=1.0).contains(&fg_fraction),
            "fg_fraction must be in range [0, 1]"
        );
        ensure!(fg_thresh.is_finite(), "fg_thresh must be a finite number");
        ensure!(
            bg_thresh_lo.is_finite() && bg_thresh_hi.is_finite(),
            "background thresholds must be finite numbers"
        );
        ensure!(
            bg_thresh_lo < bg_thresh_hi,
            "bg_thresh_lo must be less than bg_thresh_hi"
        );
        ensure!(
            target_means.iter().all(|value| value.is_finite()),
            "target_means must be finite numbers"
        );
        ensure!(
            target_stds
                .iter()
                .all(|value| value.is_finite() && *value > 0.0),
            "target_stds must be strictly positive"
        );
        ensure!(
            inside_weights.iter().all(|value| value.is_finite()),
            "inside_weights must be finite numbers"
        );

        let fg_rois_per_image = (fg_fraction * rois_per_image as f64).round() as i64;

        let sampler = RoiSampler {
            rois_per_image,
            fg_rois_per_image,
            fg_thresh,
            bg_thresh_lo,
            bg_thresh_hi,
        };
        let encoder = TargetEncoder {
            num_classes,
            normalize_targets,
            target_means: Tensor::of_slice(&target_means)
                .to_kind(Kind::Float)
                .to_device(device),
            target_stds: Tensor::of_slice(&target_stds)
                .to_kind(Kind::Float)
                .to_device(device),
            inside_weights: Tensor::of_slice(&inside_weights)
                .to_kind(Kind::Float)
                .to_device(device),
        };

        Ok(ProposalTarget {
            sampler,
            encoder,
            device,
        })
    }
}

/// Assigns detection proposals to ground-truth targets, producing proposal
/// classification labels and bounding-box regression targets.
///
/// Stateless after construction; concurrent calls on disjoint batches are
/// safe as long as each supplies its own random source.
#[derive(Debug)]
pub struct ProposalTarget {
    sampler: RoiSampler,
    encoder: TargetEncoder,
    device: Device,
}

/// The tensors handed to the detection head for one training step.
#[derive(Debug, TensorLike, Getters)]
pub struct ProposalTargetOutput {
    /// The sampled proposals in shape `[batch, rois_per_image, 5]`.
    #[get = "pub"]
    pub(crate) rois: Tensor,
    /// The classification labels in shape `[batch, rois_per_image]`.
    #[get = "pub"]
    pub(crate) labels: Tensor,
    /// The regression targets in shape `[batch, rois_per_image, 4 * num_classes]`.
    #[get = "pub"]
    pub(crate) bbox_targets: Tensor,
    /// The per-slot loss-inclusion weights, non-zero exactly where the
    /// targets are.
    #[get = "pub"]
    pub(crate) bbox_inside_weights: Tensor,
    /// The foreground-slot mask `(bbox_inside_weights > 0)`.
    #[get = "pub"]
    pub(crate) bbox_outside_weights: Tensor,
}

impl ProposalTarget {
    /// Run the full pipeline with the thread-local RNG.
    pub fn forward(
        &self,
        all_rois: &Tensor,
        gt_boxes: &Tensor,
        num_boxes: &Tensor,
    ) -> Result<ProposalTargetOutput> {
        self.forward_with_rng(all_rois, gt_boxes, num_boxes, &mut rand::thread_rng())
    }

    /// Run the full pipeline drawing samples from the supplied RNG.
    ///
    /// `num_boxes` carries the per-image valid-object counts; it is accepted
    /// at the boundary but not consulted by the sampling logic.
    pub fn forward_with_rng<R>(
        &self,
        all_rois: &Tensor,
        gt_boxes: &Tensor,
        num_boxes: &Tensor,
        rng: &mut R,
    ) -> Result<ProposalTargetOutput>
    where
        R: Rng + ?Sized,
    {
        tch::no_grad(|| {
            ensure!(
                all_rois.device() == self.device && gt_boxes.device() == self.device,
                "input tensors must live on the configured device {:?}",
                self.device
            );
            let (batch_size, _, _) = all_rois.size3()?;
            ensure!(
                num_boxes.size1()? == batch_size,
                "num_boxes must have one entry per batch item"
            );

            let pool = augment_proposals(all_rois, gt_boxes)?;
            let assignment = assign_proposals(&pool, gt_boxes)?;
            let sampled = self.sampler.sample(&pool, gt_boxes, &assignment, rng)?;
            let targets = self.encoder.encode(&sampled)?;

            Ok(ProposalTargetOutput {
                rois: sampled.rois,
                labels: sampled.labels,
                bbox_targets: targets.bbox_targets,
                bbox_inside_weights: targets.bbox_inside_weights,
                bbox_outside_weights: targets.bbox_outside_weights,
            })
        })
    }
}
