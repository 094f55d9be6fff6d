//! Stratified foreground/background sampling under a fixed per-image budget.

use crate::{assignment::GtAssignment, common::*};

/// Draws a fixed-size sample of proposals per image, foreground first.
#[derive(Debug, Clone)]
pub struct RoiSampler {
    pub(crate) rois_per_image: i64,
    pub(crate) fg_rois_per_image: i64,
    pub(crate) fg_thresh: f64,
    pub(crate) bg_thresh_lo: f64,
    pub(crate) bg_thresh_hi: f64,
}

/// The fixed-size per-image selection produced by the sampler.
///
/// Rows are ordered foreground first, then background; labels past the
/// foreground prefix are clamped to 0.
#[derive(Debug, TensorLike, Getters)]
pub struct SampledRois {
    /// The sampled proposals in shape `[batch, rois_per_image, 5]` with the
    /// batch-index column rewritten to the owning image.
    #[get = "pub"]
    pub(crate) rois: Tensor,
    /// The classification labels in shape `[batch, rois_per_image]`.
    #[get = "pub"]
    pub(crate) labels: Tensor,
    /// The assigned ground-truth rows in shape `[batch, rois_per_image, 5]`.
    #[get = "pub"]
    pub(crate) gt_rois: Tensor,
}

impl RoiSampler {
    /// Select `rois_per_image` proposals per image, targeting
    /// `fg_rois_per_image` foreground rows and filling the rest with
    /// background rows.
    ///
    /// When both candidate pools cannot cover the budget, the background
    /// suffix is padded by cycling the drawn background indices; with no
    /// background candidates at all the residual rows stay zeroed and are
    /// ignored downstream by the label-gated encoder.
    pub fn sample<R>(
        &self,
        all_rois: &Tensor,
        gt_boxes: &Tensor,
        assignment: &GtAssignment,
        rng: &mut R,
    ) -> Result<SampledRois>
    where
        R: Rng + ?Sized,
    {
        let (batch_size, _num_rois, _) = all_rois.size3()?;
        let device = all_rois.device();

        let labels_batch = Tensor::zeros(
            &[batch_size, self.rois_per_image],
            (Kind::Int64, device),
        );
        let rois_batch = Tensor::zeros(
            &[batch_size, self.rois_per_image, 5],
            (all_rois.kind(), device),
        );
        let gt_rois_batch = Tensor::zeros(
            &[batch_size, self.rois_per_image, 5],
            (gt_boxes.kind(), device),
        );

        for img in 0..batch_size {
            let max_overlaps = assignment.max_overlaps().select(0, img);

            let fg_mask = max_overlaps.ge(self.fg_thresh);
            let bg_mask = max_overlaps
                .ge(self.bg_thresh_lo)
                .logical_and(&max_overlaps.lt(self.bg_thresh_hi));

            let mut fg_inds = Vec::<i64>::from(fg_mask.nonzero().view([-1]));
            let mut bg_inds = Vec::<i64>::from(bg_mask.nonzero().view([-1]));

            // sample each pool without replacement
            let fg_take = cmp::min(self.fg_rois_per_image, fg_inds.len() as i64);
            fg_inds.shuffle(rng);
            fg_inds.truncate(fg_take as usize);

            let bg_take = cmp::min(self.rois_per_image - fg_take, bg_inds.len() as i64);
            bg_inds.shuffle(rng);
            bg_inds.truncate(bg_take as usize);

            let deficit = self.rois_per_image - fg_take - bg_take;
            if deficit > 0 {
                if bg_inds.is_empty() {
                    warn!(
                        "image {} has no background candidates, leaving {} sample slots zeroed",
                        img, deficit
                    );
                } else {
                    let pad: Vec<i64> = bg_inds
                        .iter()
                        .copied()
                        .cycle()
                        .take(deficit as usize)
                        .collect();
                    bg_inds.extend(pad);
                }
            }

            let keep: Vec<i64> = chain(fg_inds.iter().copied(), bg_inds.iter().copied()).collect();

            if !keep.is_empty() {
                let keep_len = keep.len() as i64;
                let keep_inds = Tensor::of_slice(&keep).to_device(device);

                let _ = labels_batch.select(0, img).narrow(0, 0, keep_len).copy_(
                    &assignment.labels().select(0, img).index_select(0, &keep_inds),
                );
                let _ = rois_batch.select(0, img).narrow(0, 0, keep_len).copy_(
                    &all_rois.select(0, img).index_select(0, &keep_inds),
                );
                let _ = gt_rois_batch.select(0, img).narrow(0, 0, keep_len).copy_(
                    &gt_boxes.select(0, img).index_select(
                        0,
                        &assignment
                            .gt_assignment()
                            .select(0, img)
                            .index_select(0, &keep_inds),
                    ),
                );
            }

            // authoritative background clamp: everything past the foreground
            // prefix is labeled 0, stale assigned labels included
            let _ = labels_batch
                .select(0, img)
                .narrow(0, fg_take, self.rois_per_image - fg_take)
                .fill_(0);

            // every selected row now belongs to this image
            let _ = rois_batch.select(0, img).select(1, 0).fill_(img);
        }

        Ok(SampledRois {
            rois: rois_batch,
            labels: labels_batch,
            gt_rois: gt_rois_batch,
        })
    }
}
