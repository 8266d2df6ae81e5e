//! Field-boss spawn-time arithmetic (spec §4.5, §8 property 9).

/// Returns the Unix-seconds timestamp of the next `start_time + k *
/// cycle_time` strictly after `now`. Returns `0` if `end_time` has
/// already passed, `cycle_time` is zero, or the computed candidate would
/// exceed `end_time`.
pub fn compute_next_spawn_timestamp(start_time: i64, end_time: i64, cycle_time: i64, now: i64) -> i64 {
    if end_time < now || cycle_time == 0 {
        return 0;
    }

    let candidate = if now < start_time {
        start_time
    } else {
        let elapsed = now - start_time;
        let cycles_passed = elapsed / cycle_time + 1;
        start_time + cycles_passed * cycle_time
    };

    if candidate > end_time {
        0
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_spawn_lands_on_the_following_cycle_boundary() {
        // 2024-01-01T00:00Z, 2024-12-31T00:00Z, 1h cycle, now = 2024-06-01T00:30Z
        let start_time = 1_704_067_200;
        let end_time = 1_735_603_200;
        let cycle_time = 3_600;
        let now = 1_717_201_800; // 2024-06-01T00:30:00Z

        let next = compute_next_spawn_timestamp(start_time, end_time, cycle_time, now);
        assert_eq!(next, 1_717_203_600); // 2024-06-01T01:00:00Z
        assert!(next > now);
        assert!(next <= end_time);
    }

    #[test]
    fn returns_zero_past_the_end_time() {
        assert_eq!(compute_next_spawn_timestamp(0, 100, 10, 200), 0);
    }

    #[test]
    fn returns_zero_for_a_zero_cycle() {
        assert_eq!(compute_next_spawn_timestamp(0, 1000, 0, 50), 0);
    }

    #[test]
    fn returns_zero_when_candidate_exceeds_end_time() {
        // Only candidates up to 95 fit; the next boundary after 90 is 100,
        // which exceeds end_time.
        assert_eq!(compute_next_spawn_timestamp(0, 95, 10, 90), 0);
    }

    #[test]
    fn before_the_window_opens_the_next_spawn_is_the_start_time() {
        assert_eq!(compute_next_spawn_timestamp(500, 1000, 10, 100), 500);
    }
}
