use std::time::Instant;

use anyhow::{ensure, Result};
use edda::registry::ModelType;
use edda::Gpt2Model;
use ndarray::{s, Array2};

/// Downloads a preset if needed, loads it, and pushes a synthetic prompt
/// through the decoder.
pub async fn run(name: &str, tokens: usize) -> Result<()> {
    let model_type: ModelType = name.parse()?;
    ensure!(tokens > 0, "token count must be positive");

    println!("Loading {}...", model_type.cli_name());
    let start = Instant::now();
    let model = Gpt2Model::from_registry(model_type).await?;
    println!(
        "Loaded {} parameters in {:.1}s",
        model.num_parameters(),
        start.elapsed().as_secs_f32()
    );

    let seq = tokens.min(model.config.n_ctx);
    let vocab = model.config.vocab_size;
    let input = Array2::from_shape_fn((1, seq), |(_, j)| ((j * 97 + 11) % vocab) as u32);

    let start = Instant::now();
    let logits = model.forward(&input)?;
    let elapsed = start.elapsed();

    ensure!(
        logits.iter().all(|v| v.is_finite()),
        "forward pass produced non-finite logits"
    );

    let final_row = logits.slice(s![0, seq - 1, ..]);
    let (best_id, best_score) = final_row
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |best, (id, score)| {
            if *score > best.1 {
                (id, *score)
            } else {
                best
            }
        });

    println!(
        "Forward pass over {} tokens took {:.0} ms ({} logits per position)",
        seq,
        elapsed.as_secs_f64() * 1000.0,
        logits.dim().2
    );
    println!(
        "Most likely next token id: {} (logit {:.3})",
        best_id, best_score
    );
    println!("✓ {} verified", model_type.cli_name());
    Ok(())
}
