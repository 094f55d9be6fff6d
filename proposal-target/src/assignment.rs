//! Merges ground-truth boxes into the proposal pool and assigns every
//! proposal to its best-overlapping ground-truth row.

use crate::common::*;

/// Append one synthetic proposal per ground-truth row to the candidate pool.
///
/// `all_rois` has shape `[batch, num_rois, 5]` with a leading batch-index
/// column; `gt_boxes` has shape `[batch, capacity, 5]` with the class label
/// in the last column. The appended rows copy the ground-truth coordinates
/// and leave the batch-index column zeroed; the sampler rewrites that column
/// for every selected row. This guarantees every annotated object has at
/// least one perfectly-overlapping candidate.
pub fn augment_proposals(all_rois: &Tensor, gt_boxes: &Tensor) -> Result<Tensor> {
    let (roi_batch, _num_rois, roi_entries) = all_rois.size3()?;
    let (gt_batch, capacity, gt_entries) = gt_boxes.size3()?;
    ensure!(
        roi_entries == 5,
        "expect proposals with 5 entries, get {}",
        roi_entries
    );
    ensure!(
        gt_entries == 5,
        "expect ground-truth boxes with 5 entries, get {}",
        gt_entries
    );
    ensure!(
        roi_batch == gt_batch,
        "batch size mismatch: {} vs {}",
        roi_batch,
        gt_batch
    );

    let synthetic = Tensor::zeros(
        &[gt_batch, capacity, 5],
        (all_rois.kind(), all_rois.device()),
    );
    let _ = synthetic.narrow(2, 1, 4).copy_(&gt_boxes.narrow(2, 0, 4));

    Ok(Tensor::cat(&[all_rois.shallow_clone(), synthetic], 1))
}

/// The per-proposal assignment derived from the overlap matrices.
#[derive(Debug, TensorLike, Getters)]
pub struct GtAssignment {
    /// The dense overlap scores in shape `[batch, num_rois, capacity]`.
    #[get = "pub"]
    pub(crate) overlaps: Tensor,
    /// The best overlap score per proposal in shape `[batch, num_rois]`.
    #[get = "pub"]
    pub(crate) max_overlaps: Tensor,
    /// The index of the best ground-truth row per proposal.
    #[get = "pub"]
    pub(crate) gt_assignment: Tensor,
    /// The class label of the assigned ground-truth row.
    #[get = "pub"]
    pub(crate) labels: Tensor,
}

/// Assign every proposal to the ground-truth row it overlaps most.
///
/// A pure function of its inputs: the same tensors always produce the same
/// assignment. Failures of the overlap computation propagate unmodified.
pub fn assign_proposals(all_rois: &Tensor, gt_boxes: &Tensor) -> Result<GtAssignment> {
    let (batch_size, _num_rois, roi_entries) = all_rois.size3()?;
    let (gt_batch, capacity, gt_entries) = gt_boxes.size3()?;
    ensure!(
        roi_entries == 5 && gt_entries == 5,
        "expect 5 entries per row, get {} and {}",
        roi_entries,
        gt_entries
    );
    ensure!(
        batch_size == gt_batch,
        "batch size mismatch: {} vs {}",
        batch_size,
        gt_batch
    );

    let overlaps = tch_boxes::batch_box_iou(&all_rois.narrow(2, 1, 4), &gt_boxes.narrow(2, 0, 4))?;
    let (max_overlaps, gt_assignment) = overlaps.max_dim(2, false);

    // flattened class lookup; the stride is the capacity of the ground-truth
    // tensor itself, never a constant
    let offsets = (Tensor::arange(batch_size, (Kind::Int64, gt_boxes.device()))
        * Tensor::from(capacity))
    .view([-1, 1]);
    let labels = gt_boxes
        .select(2, 4)
        .contiguous()
        .view([-1])
        .take(&(offsets + &gt_assignment))
        .to_kind(Kind::Int64);

    Ok(GtAssignment {
        overlaps,
        max_overlaps,
        gt_assignment,
        labels,
    })
}
