use anyhow::Result;
use edda::registry::{self, ModelType};

use crate::ModelCommands;

pub async fn run(action: ModelCommands) -> Result<()> {
    match action {
        ModelCommands::List => list(),
        ModelCommands::Download { name } => download(&name).await,
        ModelCommands::Info { name } => info(&name),
    }
}

fn list() -> Result<()> {
    let cache = registry::default_cache_dir();

    println!();
    println!("Cache: {}", cache.display());
    println!();
    println!(
        "  {} {:<12} {:>8} {:>8}   {}",
        " ", "NAME", "PARAMS", "SIZE", "DESCRIPTION"
    );
    println!("{}", "-".repeat(84));

    for model in ModelType::ALL {
        let meta = model.info();
        let status = if model.is_downloaded(&cache) { "✓" } else { " " };
        println!(
            "  {} {:<12} {:>8} {:>5} MB   {}",
            status,
            model.cli_name(),
            registry::format_params(meta.params_millions),
            meta.size_mb,
            meta.description
        );
    }

    println!();
    println!("Commands:");
    println!("  edda model download <name>   Fetch config and weights");
    println!("  edda model info <name>       Show details");
    println!("  edda verify <name>           Load the model and run a forward pass");
    println!();
    Ok(())
}

async fn download(name: &str) -> Result<()> {
    let model: ModelType = name.parse()?;
    let meta = model.info();
    let cache = registry::default_cache_dir();
    let model_dir = model.cache_dir(&cache);

    if model.is_downloaded(&cache) {
        println!(
            "{} is already downloaded at {}",
            model.cli_name(),
            model_dir.display()
        );
        return Ok(());
    }

    println!(
        "Downloading {} (~{} MB) to {}...",
        model.cli_name(),
        meta.size_mb,
        model_dir.display()
    );
    registry::download_model_files(&model_dir, &meta.paths).await?;
    println!("✓ Downloaded {}", model.cli_name());
    Ok(())
}

fn info(name: &str) -> Result<()> {
    let model: ModelType = name.parse()?;
    let meta = model.info();
    let config = model.config();
    let model_dir = model.cache_dir(&registry::default_cache_dir());

    println!();
    println!("  Model:       {}", model.cli_name());
    println!("  Hub repo:    {}", model.hub_repo());
    println!(
        "  Parameters:  {}",
        registry::format_params(meta.params_millions)
    );
    println!("  Layers:      {}", config.n_layer);
    println!("  Heads:       {}", config.n_head);
    println!("  Width:       {}", config.n_embd);
    println!("  Context:     {}", config.n_ctx);
    println!("  Vocabulary:  {}", config.vocab_size);
    println!();

    let weights_path = model_dir.join("model.safetensors");
    if weights_path.exists() {
        let size = weights_path.metadata().map(|m| m.len()).unwrap_or(0);
        println!("  ✓ Downloaded   {}", format_bytes(size));
    } else {
        println!("  ○ Not downloaded (~{} MB)", meta.size_mb);
    }
    println!("  Path: {}", model_dir.display());
    println!();
    println!("  {}", meta.description);
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}
