use crate::{common::*, utils::EPSILON};

// ln(1000 / 16), the largest log-space size delta decode_boxes accepts
const XFORM_CLIP: f64 = 4.135166556742356;

/// Compute the regression deltas carrying `src` boxes onto `dst` boxes.
///
/// Both inputs are `[batch, len, 4]` tensors in `(x1, y1, x2, y2)` order
/// with matching shapes. Each output row is `(dx, dy, dw, dh)`: the center
/// offset scaled by the source box size and the log-ratio of the sizes.
/// [`decode_boxes`] is the exact inverse for non-degenerate boxes.
pub fn encode_boxes(src: &Tensor, dst: &Tensor) -> Result<Tensor> {
    ensure_paired_boxes(src, dst)?;

    let (src_cx, src_cy, src_w, src_h) = to_center_size(src);
    let (dst_cx, dst_cy, dst_w, dst_h) = to_center_size(dst);

    let dx = (dst_cx - src_cx) / &src_w;
    let dy = (dst_cy - src_cy) / &src_h;
    let dw = (dst_w / src_w).log();
    let dh = (dst_h / src_h).log();

    Ok(Tensor::stack(&[dx, dy, dw, dh], 2))
}

/// Apply regression deltas to `src` boxes, undoing [`encode_boxes`].
///
/// `dw` and `dh` are clamped before exponentiation so that malformed
/// predictions cannot overflow.
pub fn decode_boxes(src: &Tensor, deltas: &Tensor) -> Result<Tensor> {
    ensure_paired_boxes(src, deltas)?;

    let (src_cx, src_cy, src_w, src_h) = to_center_size(src);

    let dx = deltas.select(2, 0);
    let dy = deltas.select(2, 1);
    let dw = deltas.select(2, 2).clamp_max(XFORM_CLIP);
    let dh = deltas.select(2, 3).clamp_max(XFORM_CLIP);

    let pred_cx = dx * &src_w + src_cx;
    let pred_cy = dy * &src_h + src_cy;
    let pred_w = dw.exp() * src_w;
    let pred_h = dh.exp() * src_h;

    let x1 = &pred_cx - &pred_w * 0.5;
    let y1 = &pred_cy - &pred_h * 0.5;
    let x2 = &pred_cx + &pred_w * 0.5;
    let y2 = &pred_cy + &pred_h * 0.5;

    Ok(Tensor::stack(&[x1, y1, x2, y2], 2))
}

fn ensure_paired_boxes(lhs: &Tensor, rhs: &Tensor) -> Result<()> {
    let (lhs_batch, lhs_len, lhs_entries) = lhs.size3()?;
    let (rhs_batch, rhs_len, rhs_entries) = rhs.size3()?;
    ensure!(
        lhs_entries == 4 && rhs_entries == 4,
        "expect 4 entries per row, get {} and {}",
        lhs_entries,
        rhs_entries
    );
    ensure!(
        lhs_batch == rhs_batch && lhs_len == rhs_len,
        "paired tensors differ in shape: {:?} vs {:?}",
        lhs.size(),
        rhs.size()
    );
    ensure!(lhs.device() == rhs.device(), "device mismatch");
    Ok(())
}

// Sizes are clamped away from zero so that degenerate boxes produce finite
// deltas; downstream masking discards those rows.
fn to_center_size(boxes: &Tensor) -> (Tensor, Tensor, Tensor, Tensor) {
    let x1 = boxes.select(2, 0);
    let y1 = boxes.select(2, 1);
    let x2 = boxes.select(2, 2);
    let y2 = boxes.select(2, 3);

    let cx = (&x1 + &x2) * 0.5;
    let cy = (&y1 + &y2) * 0.5;
    let w = (x2 - x1).clamp_min(EPSILON);
    let h = (y2 - y1).clamp_min(EPSILON);

    (cx, cy, w, h)
}
