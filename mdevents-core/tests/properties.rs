#![allow(clippy::uninlined_format_args)]
//! Randomized properties of the event order and the time-ROI algebra.

use mdevents_core::{DateAndTime, MdEvent, TimeRoi, ROI_USE};
use proptest::prelude::*;

fn small_value() -> impl Strategy<Value = f32> {
    // A tiny domain so ties are common.
    prop::sample::select(vec![-1.0_f32, 0.0, 0.5, 1.0])
}

fn event() -> impl Strategy<Value = MdEvent> {
    (
        prop::collection::vec(small_value(), 2),
        small_value(),
        small_value(),
    )
        .prop_map(|(coords, signal, error)| MdEvent::new(coords, signal, error))
}

#[derive(Debug, Clone)]
enum RoiOp {
    Use(i64, i64),
    Mask(i64, i64),
}

fn roi_op() -> impl Strategy<Value = RoiOp> {
    (0_i64..20, 1_i64..10, any::<bool>()).prop_map(|(start, len, is_use)| {
        if is_use {
            RoiOp::Use(start, start + len)
        } else {
            RoiOp::Mask(start, start + len)
        }
    })
}

fn t(seconds: i64) -> DateAndTime {
    DateAndTime::from_nanos(seconds * 1_000_000_000)
}

fn build_roi(ops: &[RoiOp]) -> TimeRoi {
    let mut roi = TimeRoi::new();
    for op in ops {
        match *op {
            RoiOp::Use(a, b) => roi.add_roi(t(a), t(b)).unwrap(),
            RoiOp::Mask(a, b) => roi.add_mask(t(a), t(b)).unwrap(),
        }
    }
    roi
}

fn roi() -> impl Strategy<Value = TimeRoi> {
    prop::collection::vec(roi_op(), 0..6).prop_map(|ops| build_roi(&ops))
}

proptest! {
    #[test]
    fn event_order_is_transitive(a in event(), b in event(), c in event()) {
        if a <= b && b <= c {
            prop_assert!(a <= c, "{} <= {} <= {} but not {} <= {}", a, b, c, a, c);
        }
        if a < b && b < c {
            prop_assert!(a < c);
        }
    }

    #[test]
    fn event_order_is_antisymmetric(a in event(), b in event()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        prop_assert_eq!(a == b, a.cmp(&b).is_eq());
    }

    #[test]
    fn add_roi_is_half_open(base in roi(), start in 0_i64..30, len in 1_i64..10) {
        let stop = start + len;
        let before = base.value_at_time(t(stop));
        let mut roi = base;
        roi.add_roi(t(start), t(stop)).unwrap();
        prop_assert_eq!(roi.value_at_time(t(start)), ROI_USE);
        prop_assert_eq!(roi.value_at_time(t(stop)), before);
    }

    #[test]
    fn intersection_is_pointwise_and(a in roi(), b in roi()) {
        let mut result = a.clone();
        result.update_intersection(&b);
        for s in -1..35 {
            let time = t(s);
            prop_assert_eq!(
                result.value_at_time(time),
                a.value_at_time(time) && b.value_at_time(time),
                "at {}s", s
            );
        }
    }

    #[test]
    fn union_is_pointwise_or(a in roi(), b in roi()) {
        let mut result = a.clone();
        result.update_union(&b);
        for s in -1..35 {
            let time = t(s);
            prop_assert_eq!(
                result.value_at_time(time),
                a.value_at_time(time) || b.value_at_time(time),
                "at {}s", s
            );
        }
    }

    #[test]
    fn intersection_commutes(a in roi(), b in roi()) {
        let mut ab = a.clone();
        ab.update_intersection(&b);
        let mut ba = b.clone();
        ba.update_intersection(&a);
        let ab_bounds: Vec<_> = ab.boundaries().collect();
        let ba_bounds: Vec<_> = ba.boundaries().collect();
        prop_assert_eq!(ab_bounds, ba_bounds);
    }

    #[test]
    fn intersection_is_idempotent(a in roi()) {
        let mut result = a.clone();
        result.update_intersection(&a);
        prop_assert_eq!(result, a);
    }
}

#[test]
fn test_duration_of_single_roi_is_exact() {
    let roi = TimeRoi::from_range(
        DateAndTime::from_nanos(1_000_000_000),
        DateAndTime::from_nanos(3_500_000_000),
    )
    .unwrap();
    assert!((roi.duration_in_seconds() - 2.5).abs() < f64::EPSILON);
}
