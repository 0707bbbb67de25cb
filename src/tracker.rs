//! Per-screen multi-object tracking: gated greedy assignment, EMA
//! smoothing, and birth/death hysteresis over stable session ids.

use log::debug;

use crate::fusion::FusedPoint;
use crate::types::{euclidean, GlobalParams, Touch, TouchEvent, TouchEventKind};

/// One screen's tracker state, surviving across frames.
#[derive(Debug, Clone)]
pub struct Tracker {
    screen_id: u32,
    touches: Vec<Touch>,
    next_session_id: u32,
    params: GlobalParams,
    gate_radius: f64,
}

impl Tracker {
    pub fn new(screen_id: u32, params: GlobalParams, screen_diagonal: f64) -> Self {
        Tracker {
            screen_id,
            touches: Vec::new(),
            next_session_id: 0,
            gate_radius: params.r_gate_fraction * screen_diagonal,
            params,
        }
    }

    pub fn touches(&self) -> &[Touch] {
        &self.touches
    }

    /// Advance the tracker by one frame: gate-assign `fused` points to
    /// existing touches (greedy nearest-neighbor with deletion, ties broken
    /// by lower touch index then lower candidate index), apply EMA updates
    /// to matches, start provisional touches for unmatched candidates, and
    /// age out touches that went unmatched beyond `death_threshold`.
    ///
    /// `dt` is the elapsed time in seconds since the previous frame, used to
    /// predict each touch's position before gating.
    pub fn step(&mut self, fused: &[FusedPoint], timestamp_ns: u64, dt: f64) -> Vec<TouchEvent> {
        let mut events = Vec::new();

        let mut candidate_used = vec![false; fused.len()];
        let mut touch_matched = vec![false; self.touches.len()];

        // Build the full gated cost list, then greedily consume the globally
        // cheapest pair first so ties resolve by (touch index, candidate
        // index) only when costs are exactly equal.
        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (ti, touch) in self.touches.iter().enumerate() {
            let predicted = touch.predicted(dt);
            for (ci, point) in fused.iter().enumerate() {
                let cost = euclidean(predicted, (point.u, point.v));
                if cost <= self.gate_radius {
                    pairs.push((cost, ti, ci));
                }
            }
        }
        pairs.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap()
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        for (_, ti, ci) in pairs {
            if touch_matched[ti] || candidate_used[ci] {
                continue;
            }
            touch_matched[ti] = true;
            candidate_used[ci] = true;

            let point = &fused[ci];
            let touch = &mut self.touches[ti];
            let (pred_u, pred_v) = touch.predicted(dt);
            let new_u = self.params.beta * point.u + (1.0 - self.params.beta) * pred_u;
            let new_v = self.params.beta * point.v + (1.0 - self.params.beta) * pred_v;
            let (new_du, new_dv) = if dt > 0.0 {
                let measured_du = (new_u - touch.u) / dt;
                let measured_dv = (new_v - touch.v) / dt;
                (
                    self.params.gamma * measured_du + (1.0 - self.params.gamma) * touch.du,
                    self.params.gamma * measured_dv + (1.0 - self.params.gamma) * touch.dv,
                )
            } else {
                (touch.du, touch.dv)
            };

            touch.u = new_u;
            touch.v = new_v;
            touch.du = new_du;
            touch.dv = new_dv;
            touch.last_update_ns = timestamp_ns;
            touch.missed = 0;
            touch.age += 1;

            // birth_grace counts silent matched frames before confirmation,
            // so confirmation lands on the (birth_grace + 1)th match.
            if !touch.confirmed && touch.age > self.params.birth_grace {
                touch.confirmed = true;
                events.push(TouchEvent {
                    kind: TouchEventKind::Add,
                    session_id: touch.session_id,
                    screen_id: self.screen_id,
                    u: touch.u,
                    v: touch.v,
                    du: touch.du,
                    dv: touch.dv,
                    timestamp_ns,
                });
            } else if touch.confirmed {
                events.push(TouchEvent {
                    kind: TouchEventKind::Update,
                    session_id: touch.session_id,
                    screen_id: self.screen_id,
                    u: touch.u,
                    v: touch.v,
                    du: touch.du,
                    dv: touch.dv,
                    timestamp_ns,
                });
            }
        }

        // Unmatched touches: a provisional touch gets no grace for flicker
        // and is dropped on its first miss; a confirmed touch is dropped
        // (and a Remove emitted) only once missed reaches death_threshold.
        let mut i = 0;
        while i < self.touches.len() {
            if touch_matched[i] {
                i += 1;
                continue;
            }
            self.touches[i].missed += 1;
            let confirmed = self.touches[i].confirmed;
            if (!confirmed && self.touches[i].missed >= 1) || self.touches[i].missed >= self.params.death_threshold {
                let dead = self.touches.remove(i);
                touch_matched.remove(i);
                if dead.confirmed {
                    events.push(TouchEvent {
                        kind: TouchEventKind::Remove,
                        session_id: dead.session_id,
                        screen_id: self.screen_id,
                        u: dead.u,
                        v: dead.v,
                        du: dead.du,
                        dv: dead.dv,
                        timestamp_ns,
                    });
                }
                debug!("screen {}: touch {} died", self.screen_id, dead.session_id);
            } else {
                i += 1;
            }
        }

        // Unmatched candidates: start new provisional touches.
        for (ci, point) in fused.iter().enumerate() {
            if candidate_used[ci] {
                continue;
            }
            let session_id = self.next_session_id;
            self.next_session_id += 1;
            let confirmed = self.params.birth_grace == 0;
            let touch = Touch {
                session_id,
                screen_id: self.screen_id,
                u: point.u,
                v: point.v,
                last_update_ns: timestamp_ns,
                age: 1,
                missed: 0,
                du: 0.0,
                dv: 0.0,
                confirmed,
            };
            if confirmed {
                events.push(TouchEvent {
                    kind: TouchEventKind::Add,
                    session_id,
                    screen_id: self.screen_id,
                    u: touch.u,
                    v: touch.v,
                    du: touch.du,
                    dv: touch.dv,
                    timestamp_ns,
                });
            }
            self.touches.push(touch);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(u: f64, v: f64, weight: f64) -> FusedPoint {
        FusedPoint {
            u,
            v,
            weight,
            sources: Vec::new(),
        }
    }

    fn params(birth_grace: u32, death_threshold: u32) -> GlobalParams {
        GlobalParams {
            r_merge_fraction: 0.02,
            r_gate_fraction: 0.3,
            beta: 0.5,
            gamma: 0.5,
            death_threshold,
            birth_grace,
            heartbeat_interval_ms: 1000,
        }
    }

    #[test]
    fn new_touch_stays_provisional_until_birth_grace_elapses() {
        // birth_grace=2: the touch must be matched on 3 consecutive frames
        // (the creation frame plus two more) before it is confirmed.
        let mut tracker = Tracker::new(0, params(2, 3), 1.414);
        let events = tracker.step(&[point(0.5, 0.5, 4.0)], 0, 0.1);
        assert!(events.is_empty());
        let events = tracker.step(&[point(0.5, 0.5, 4.0)], 1, 0.1);
        assert!(events.is_empty());
        let events = tracker.step(&[point(0.5, 0.5, 4.0)], 2, 0.1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TouchEventKind::Add);
    }

    #[test]
    fn confirmed_touch_emits_update_each_matched_frame() {
        let mut tracker = Tracker::new(0, params(0, 3), 1.414);
        let events = tracker.step(&[point(0.5, 0.5, 4.0)], 0, 0.1);
        assert_eq!(events[0].kind, TouchEventKind::Add);
        let events = tracker.step(&[point(0.51, 0.5, 4.0)], 1, 0.1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TouchEventKind::Update);
    }

    #[test]
    fn touch_dies_after_death_threshold_missed_frames() {
        let mut tracker = Tracker::new(0, params(0, 2), 1.414);
        tracker.step(&[point(0.5, 0.5, 4.0)], 0, 0.1);
        let events = tracker.step(&[], 1, 0.1);
        assert!(events.is_empty());
        let events = tracker.step(&[], 2, 0.1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TouchEventKind::Remove);
        assert!(tracker.touches().is_empty());
    }

    #[test]
    fn reappearance_within_death_threshold_keeps_same_session_id() {
        let mut tracker = Tracker::new(0, params(0, 3), 1.414);
        let events = tracker.step(&[point(0.5, 0.5, 4.0)], 0, 0.1);
        let session_id = events[0].session_id;
        tracker.step(&[], 1, 0.1);
        let events = tracker.step(&[point(0.5, 0.5, 4.0)], 2, 0.1);
        assert_eq!(events[0].session_id, session_id);
        assert_eq!(events[0].kind, TouchEventKind::Update);
    }

    #[test]
    fn provisional_touch_is_dropped_on_its_first_miss() {
        // birth_grace=2: still provisional after one matched frame, so a
        // single miss must drop it outright, with no Remove event and no
        // surviving slot to re-confirm into.
        let mut tracker = Tracker::new(0, params(2, 3), 1.414);
        tracker.step(&[point(0.5, 0.5, 4.0)], 0, 0.1);
        assert_eq!(tracker.touches().len(), 1);
        let events = tracker.step(&[], 1, 0.1);
        assert!(events.is_empty(), "a provisional touch's death is silent");
        assert!(tracker.touches().is_empty());
    }

    #[test]
    fn far_candidate_outside_gate_starts_a_new_touch() {
        let mut tracker = Tracker::new(0, params(0, 3), 1.414);
        tracker.step(&[point(0.1, 0.1, 4.0)], 0, 0.1);
        let events = tracker.step(&[point(0.9, 0.9, 4.0)], 1, 0.1);
        // first touch missed, second candidate births a new touch
        let adds: Vec<_> = events.iter().filter(|e| e.kind == TouchEventKind::Add).collect();
        assert_eq!(adds.len(), 1);
        assert_eq!(tracker.touches().len(), 2);
    }

    #[test]
    fn scenario_s1_birth_grace_two_then_seven_updates() {
        let mut tracker = Tracker::new(0, params(2, 3), 1.0);
        let mut total_events = Vec::new();
        for frame in 0..10u64 {
            let events = tracker.step(&[point(0.5, 0.5, 4.0)], frame, 0.1);
            total_events.extend(events);
        }
        let adds = total_events
            .iter()
            .filter(|e| e.kind == TouchEventKind::Add)
            .count();
        let updates = total_events
            .iter()
            .filter(|e| e.kind == TouchEventKind::Update)
            .count();
        assert_eq!(adds, 1);
        assert_eq!(updates, 7);
    }
}
