use crate::decode::ScaledProposal;

/// Boxes at or below this many working-image pixels are dropped (30x30).
pub const MIN_PROPOSAL_AREA: i64 = 30 * 30;

/// Greedy non-maximum suppression over `box_scaled`.
///
/// Proposals are visited by descending confidence (ties keep input order); a
/// proposal is kept unless it overlaps an already kept one by more than
/// `iou_threshold`. The result is in descending confidence order.
pub fn nms(proposals: Vec<ScaledProposal>, iou_threshold: f32) -> Vec<ScaledProposal> {
    let mut sorted = proposals;
    sorted.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));

    let mut keep: Vec<ScaledProposal> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        let suppressed = keep
            .iter()
            .any(|kept| kept.box_scaled.iou(&candidate.box_scaled) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// NMS followed by the minimum-area gate.
pub fn filter_proposals(proposals: Vec<ScaledProposal>, iou_threshold: f32) -> Vec<ScaledProposal> {
    let total = proposals.len();
    let kept: Vec<ScaledProposal> = nms(proposals, iou_threshold)
        .into_iter()
        .filter(|p| p.box_scaled.area() > MIN_PROPOSAL_AREA)
        .collect();
    log::debug!("filtered {} proposals down to {}", total, kept.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{Proposal, NUM_KEYPOINTS};
    use crate::geometry::{PixelRect, Point, Rect};

    fn proposal(x: i32, y: i32, w: i32, h: i32, confidence: f32) -> ScaledProposal {
        ScaledProposal {
            proposal: Proposal {
                confidence,
                box_raw: Rect::default(),
                landmarks_raw: [Point::default(); NUM_KEYPOINTS],
            },
            box_scaled: PixelRect::new(x, y, w, h),
            landmarks_scaled: [Point::default(); NUM_KEYPOINTS],
        }
    }

    #[test]
    fn test_nms() {
        let proposals = vec![
            proposal(10, 10, 20, 20, 0.8),
            proposal(12, 12, 20, 20, 0.9),
            proposal(100, 100, 20, 20, 0.85),
        ];

        let result = nms(proposals, 0.3);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].box_scaled, PixelRect::new(12, 12, 20, 20));
        assert_eq!(result[1].box_scaled, PixelRect::new(100, 100, 20, 20));
    }

    #[test]
    fn test_nms_no_surviving_pair_overlaps() {
        let mut proposals = Vec::new();
        for n in 0..12 {
            let c = 0.6 + n as f32 * 0.03;
            proposals.push(proposal(n * 7, (n % 3) * 9, 60, 60, c));
        }
        let threshold = 0.5;
        let kept = nms(proposals.clone(), threshold);

        for (a, b) in kept.iter().zip(kept.iter().skip(1)) {
            assert!(a.confidence() >= b.confidence());
        }
        for (n, a) in kept.iter().enumerate() {
            for b in kept.iter().skip(n + 1) {
                assert!(a.box_scaled.iou(&b.box_scaled) <= threshold);
            }
        }
        // the most confident proposal is always kept
        let best = proposals
            .iter()
            .max_by(|a, b| a.confidence().total_cmp(&b.confidence()))
            .unwrap();
        assert_eq!(kept[0], *best);
    }

    #[test]
    fn test_chain_suppression_is_greedy() {
        // b overlaps both a and c, a and c are disjoint
        let a = proposal(0, 0, 100, 100, 0.95);
        let b = proposal(50, 0, 100, 100, 0.9);
        let c = proposal(100, 0, 100, 100, 0.85);
        let kept = nms(vec![c.clone(), b, a.clone()], 0.3);
        assert_eq!(kept, vec![a, c]);
    }

    #[test]
    fn test_min_area_gate() {
        let proposals = vec![
            proposal(0, 0, 30, 30, 0.9),
            proposal(100, 100, 31, 30, 0.8),
            proposal(200, 200, 10, 200, 0.7),
        ];
        let kept = filter_proposals(proposals, 0.5);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|p| p.box_scaled.area() > MIN_PROPOSAL_AREA));
    }

    #[test]
    fn test_empty() {
        assert!(filter_proposals(Vec::new(), 0.5).is_empty());
    }
}
