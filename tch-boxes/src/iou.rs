use crate::{common::*, utils::EPSILON};

/// Compute dense per-image IoU matrices between two batched box sets.
///
/// Both inputs are in `(x1, y1, x2, y2)` order with shapes
/// `[batch, lhs_len, 4]` and `[batch, rhs_len, 4]`. The output has shape
/// `[batch, lhs_len, rhs_len]` where entry `(b, i, j)` is the IoU of the
/// i-th left box and the j-th right box of batch item `b`. Zero-area boxes
/// on either side yield zero overlap.
pub fn batch_box_iou(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let (lhs_batch, _lhs_len, lhs_entries) = lhs.size3()?;
    let (rhs_batch, _rhs_len, rhs_entries) = rhs.size3()?;
    ensure!(
        lhs_entries == 4 && rhs_entries == 4,
        "expect boxes with 4 coordinates, get {} and {}",
        lhs_entries,
        rhs_entries
    );
    ensure!(
        lhs_batch == rhs_batch,
        "batch size mismatch: {} vs {}",
        lhs_batch,
        rhs_batch
    );
    ensure!(lhs.device() == rhs.device(), "device mismatch");

    // [batch, lhs_len, 1] coordinates against [batch, 1, rhs_len]
    let lhs_l = lhs.select(2, 0).unsqueeze(2);
    let lhs_t = lhs.select(2, 1).unsqueeze(2);
    let lhs_r = lhs.select(2, 2).unsqueeze(2);
    let lhs_b = lhs.select(2, 3).unsqueeze(2);

    let rhs_l = rhs.select(2, 0).unsqueeze(1);
    let rhs_t = rhs.select(2, 1).unsqueeze(1);
    let rhs_r = rhs.select(2, 2).unsqueeze(1);
    let rhs_b = rhs.select(2, 3).unsqueeze(1);

    let max_l = lhs_l.maximum(&rhs_l);
    let max_t = lhs_t.maximum(&rhs_t);
    let min_r = lhs_r.minimum(&rhs_r);
    let min_b = lhs_b.minimum(&rhs_b);

    let inner_w = (min_r - max_l).clamp_min(0.0);
    let inner_h = (min_b - max_t).clamp_min(0.0);
    let inner_area = inner_w * inner_h;

    let lhs_area = (&lhs_r - &lhs_l) * (&lhs_b - &lhs_t);
    let rhs_area = (&rhs_r - &rhs_l) * (&rhs_b - &rhs_t);
    let outer_area = &lhs_area + &rhs_area - &inner_area + EPSILON;
    let iou = inner_area / outer_area;

    // degenerate boxes overlap nothing
    let zero_mask = lhs_area.le(0.0).logical_or(&rhs_area.le(0.0));
    Ok(iou.masked_fill(&zero_mask, 0.0))
}
