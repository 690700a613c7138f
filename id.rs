use rand::Rng;

const BASE62_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of a generated task id, in characters.
pub const TASK_ID_LENGTH: usize = 6;

/// CSPRNG-sourced base62 string, used to fill in a task id when the caller
/// didn't supply their own.
pub fn rand_base62(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..BASE62_CHARS.len());
            BASE62_CHARS[idx] as char
        })
        .collect()
}
