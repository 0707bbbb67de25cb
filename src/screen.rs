//! Screen containment and coordinate normalization.

use crate::types::{Candidate, MappedCandidate, ScreenRect};

/// Test one candidate against one screen, returning a `MappedCandidate` if
/// the candidate's sensor is allowed on this screen and its projected
/// local-frame position lies within the rectangle.
pub fn map_onto_screen(candidate: &Candidate, screen: &ScreenRect) -> Option<MappedCandidate> {
    if !screen.allowed_sensors.contains(&candidate.sensor_id) {
        return None;
    }

    let dx = candidate.x - screen.x;
    let dy = candidate.y - screen.y;
    let cos_r = (-screen.rotation).cos();
    let sin_r = (-screen.rotation).sin();
    let local_x = dx * cos_r - dy * sin_r;
    let local_y = dx * sin_r + dy * cos_r;

    if local_x < 0.0 || local_x > screen.w || local_y < 0.0 || local_y > screen.h {
        return None;
    }

    Some(MappedCandidate {
        candidate: candidate.clone(),
        screen_id: screen.id,
        u: local_x / screen.w,
        v: local_y / screen.h,
    })
}

/// Map every candidate against every screen; a candidate maps to zero or
/// one screens, with the smallest screen id winning on overlap.
pub fn map_candidates(candidates: &[Candidate], screens: &[ScreenRect]) -> Vec<MappedCandidate> {
    let mut sorted_screens: Vec<&ScreenRect> = screens.iter().collect();
    sorted_screens.sort_by_key(|s| s.id);

    candidates
        .iter()
        .filter_map(|candidate| {
            sorted_screens
                .iter()
                .find_map(|screen| map_onto_screen(candidate, screen))
        })
        .collect()
}
