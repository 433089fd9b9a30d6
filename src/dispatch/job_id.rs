use chrono::{DateTime, Local};

/// 基于时间戳分配 job id，同一进程内保证唯一。
/// 时间戳精确到微秒；与上一个 id 的时间戳相同（或时钟回拨）时追加 `_N`
#[derive(Debug, Default)]
pub struct JobIdAllocator {
    last_stamp: Option<String>,
    collisions: u32,
}

impl JobIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> String {
        self.next_at(Local::now())
    }

    pub fn next_at(&mut self, now: DateTime<Local>) -> String {
        let stamp = now.format("%Y%m%d_%H%M%S_%6f").to_string();
        match self.last_stamp.as_deref() {
            Some(last) if stamp.as_str() <= last => {
                self.collisions += 1;
                format!("job_{}_{}", last, self.collisions)
            }
            _ => {
                self.last_stamp = Some(stamp.clone());
                self.collisions = 0;
                format!("job_{}", stamp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn same_instant_gets_disambiguated() {
        let mut ids = JobIdAllocator::new();
        let t = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let a = ids.next_at(t);
        let b = ids.next_at(t);
        let c = ids.next_at(t);
        assert_eq!(a, "job_20240501_093000_000000");
        assert_eq!(b, "job_20240501_093000_000000_1");
        assert_eq!(c, "job_20240501_093000_000000_2");
    }

    #[test]
    fn clock_going_backwards_stays_unique() {
        let mut ids = JobIdAllocator::new();
        let later = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap();
        let earlier = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let a = ids.next_at(later);
        let b = ids.next_at(earlier);
        assert_ne!(a, b);
        let c = ids.next_at(Local.with_ymd_and_hms(2024, 5, 1, 9, 31, 0).unwrap());
        assert_eq!(c, "job_20240501_093100_000000");
    }

    #[test]
    fn many_ids_are_unique() {
        let mut ids = JobIdAllocator::new();
        let set: HashSet<String> = (0..500).map(|_| ids.next_id()).collect();
        assert_eq!(set.len(), 500);
    }
}
