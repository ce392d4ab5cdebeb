//! OpenAI list prices, USD per million tokens

/// (model, input price, output price)
const CHAT_PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4.1-nano", 0.10, 0.40),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.00, 8.00),
    ("gpt-4-turbo", 10.00, 30.00),
    ("gpt-3.5-turbo", 0.50, 1.50),
    ("o3-mini", 1.10, 4.40),
    ("o4-mini", 1.10, 4.40),
];

const EMBEDDING_PRICES: &[(&str, f64)] = &[
    ("text-embedding-3-small", 0.02),
    ("text-embedding-3-large", 0.13),
    ("text-embedding-ada-002", 0.10),
];

const PER_MILLION: f64 = 1_000_000.0;

/// Longest table key that prefixes `model`, so dated snapshots such as
/// `gpt-4o-mini-2024-07-18` price as their base model.
fn lookup<'a, T>(table: &'a [T], model: &str, key: impl Fn(&T) -> &str) -> Option<&'a T> {
    table
        .iter()
        .filter(|entry| model.starts_with(key(entry)))
        .max_by_key(|entry| key(entry).len())
}

/// Cost of a chat completion; unknown models cost nothing
pub fn chat_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    match lookup(CHAT_PRICES, model, |e| e.0) {
        Some((_, input, output)) => {
            (prompt_tokens as f64 * input + completion_tokens as f64 * output) / PER_MILLION
        }
        None => 0.0,
    }
}

/// Cost of an embedding request; unknown models cost nothing
pub fn embedding_cost(model: &str, total_tokens: u64) -> f64 {
    match lookup(EMBEDDING_PRICES, model, |e| e.0) {
        Some((_, price)) => total_tokens as f64 * price / PER_MILLION,
        None => 0.0,
    }
}
