use std::sync::Mutex;

use rand::Rng;

/// Alphabet in ASCII order, so byte comparison of ids matches generation order.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_LEN: usize = 8;
const RAND_LEN: usize = 12;

/// Generates 20-character, time-ordered keys for pushed children.
///
/// The first 8 characters encode the millisecond timestamp, the last 12 are
/// random. Ids created within the same millisecond reuse the previous random
/// tail incremented by one, so one generator never produces a key that sorts
/// before an earlier one, even if the wall clock steps backwards.
pub struct PushIdGenerator {
    state: Mutex<PushState>,
}

struct PushState {
    last_millis: i64,
    last_rand: [u8; RAND_LEN],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PushState {
                last_millis: -1,
                last_rand: [0; RAND_LEN],
            }),
        }
    }

    pub fn next_id(&self) -> String {
        self.next_id_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn next_id_at(&self, millis: i64) -> String {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let millis = millis.max(state.last_millis).max(0);
        if millis == state.last_millis {
            increment(&mut state.last_rand);
        } else {
            state.last_millis = millis;
            let mut rng = rand::rng();
            for digit in state.last_rand.iter_mut() {
                *digit = rng.random_range(0..64);
            }
        }

        let mut id = [0u8; TIME_LEN + RAND_LEN];
        let mut remaining = millis;
        for slot in id[..TIME_LEN].iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }
        for (slot, digit) in id[TIME_LEN..].iter_mut().zip(state.last_rand) {
            *slot = PUSH_CHARS[digit as usize];
        }

        id.iter().map(|&b| b as char).collect()
    }
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Base-64 increment with carry, least significant digit last.
fn increment(digits: &mut [u8; RAND_LEN]) {
    for digit in digits.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
}
