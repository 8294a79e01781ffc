//! Integration tests for content and URI fingerprinting.

use std::collections::HashSet;

use crawl_governor::core::{HashGenerator, Md5HashGenerator, Murmur3HashGenerator};
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_strings(count: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(count);
    while seen.len() < count {
        let len = rng.random_range(8..64);
        let s: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        seen.insert(s);
    }
    seen.into_iter().collect()
}

fn assert_no_collisions(generator: &dyn HashGenerator, inputs: &[String]) {
    let digests: HashSet<_> = inputs
        .iter()
        .map(|s| generator.generate_hash_str(s))
        .collect();
    assert_eq!(digests.len(), inputs.len());
}

#[test]
fn test_md5_has_no_collisions_on_random_input() {
    assert_no_collisions(&Md5HashGenerator, &random_strings(10_000, 7));
}

#[test]
fn test_murmur3_has_no_collisions_on_random_input() {
    assert_no_collisions(&Murmur3HashGenerator::new(), &random_strings(10_000, 11));
}

#[test]
fn test_digests_are_deterministic() {
    let inputs = random_strings(100, 3);
    for generator in [
        Box::new(Md5HashGenerator) as Box<dyn HashGenerator>,
        Box::new(Murmur3HashGenerator::new()),
    ] {
        for input in &inputs {
            let first = generator.generate_hash_str(input);
            assert_eq!(first, generator.generate_hash_str(input));
            assert_eq!(first.as_bytes().len(), 16);
        }
    }
}

#[test]
fn test_strategies_disagree() {
    let input = b"https://example.com/index.html";
    assert_ne!(
        Md5HashGenerator.generate_hash(input),
        Murmur3HashGenerator::new().generate_hash(input)
    );
}

#[test]
fn test_seed_changes_murmur3_digest() {
    let input = b"<html><body>hello</body></html>";
    assert_ne!(
        Murmur3HashGenerator::with_seed(144).generate_hash(input),
        Murmur3HashGenerator::with_seed(145).generate_hash(input)
    );
}

#[test]
fn test_non_ascii_collapses_to_question_mark() {
    let generator = Murmur3HashGenerator::new();
    assert_eq!(
        generator.generate_hash_str("caf\u{e9}"),
        generator.generate_hash_str("caf?")
    );
}

#[test]
fn test_digest_hex_rendering() {
    let digest = Md5HashGenerator.generate_hash(b"");
    assert_eq!(digest.to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
    assert_eq!(digest.to_string().len(), 32);
}
