use rand::Rng;

use super::PlayerId;

/// Alphabet in ASCII order so ids sort lexicographically by creation time
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

/// Length of every generated id
pub const PUSH_ID_LEN: usize = TIME_CHARS + RANDOM_CHARS;

/// Generates coordination-free, time-ordered record keys
///
/// Eight characters encode the millisecond timestamp, twelve are random. Ids
/// generated within the same millisecond (or while the clock runs backwards)
/// reuse the previous timestamp and increment the random part, so keys from one
/// generator are strictly increasing.
#[derive(Debug, Clone, Default)]
pub struct PushIdGenerator {
    last_time: u64,
    last_random: [u8; RANDOM_CHARS],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now_ms: u64) -> PlayerId {
        if now_ms > self.last_time {
            self.last_time = now_ms;
            let mut rng = rand::thread_rng();
            for slot in self.last_random.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        } else {
            self.increment_random();
        }

        let mut id = String::with_capacity(PUSH_ID_LEN);
        let mut time = self.last_time;
        let mut time_chars = [0u8; TIME_CHARS];
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(time % 64) as usize];
            time /= 64;
        }
        id.extend(time_chars.iter().map(|&b| b as char));
        id.extend(
            self.last_random
                .iter()
                .map(|&idx| PUSH_CHARS[idx as usize] as char),
        );

        PlayerId::new(id)
    }

    fn increment_random(&mut self) {
        for slot in self.last_random.iter_mut().rev() {
            if *slot == 63 {
                *slot = 0;
            } else {
                *slot += 1;
                return;
            }
        }
    }
}
