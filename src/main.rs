use std::path::PathBuf;
use clap::Parser;
use log::{debug, error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use sketchgen::config::{load_dotenv, SketchConfig};
use sketchgen::hooks::{LogSurface, StaticIdentity};
use sketchgen::history::{JsonlHistory, MessageStore, NullHistory};
use sketchgen::{
  Error, OpenAiClient, PromptReply, RetryPolicy, RunOutcome,
  SketchBackend, SketchBackendState,
};

/// Turn prompts into running p5.js sketches
#[derive(Debug, Parser)]
#[command(name = "sketchgen", version)]
struct Args
{   /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>
  , /// Output directory for index.html and sketch.js
    #[arg(long)]
    out: Option<PathBuf>
  , /// Append chat history to this JSON-lines file
    #[arg(long)]
    history: Option<PathBuf>
  , /// Model identifier
    #[arg(long)]
    model: Option<String>
  , /// `.env` file with OPENAI_API_KEY and friends
    #[arg(long, default_value = ".env")]
    env_file: PathBuf
  , /// Run a single prompt and exit
    #[arg(long)]
    prompt: Option<String>
}

fn load_config(args: &Args) -> Result<SketchConfig, Error>
{   let mut config = match &args.config
    {   Some(path) => SketchConfig::from_file(path)?
      , None => SketchConfig::default()
    };

    let dotenv = load_dotenv(&args.env_file)?;
    config.apply_env(|key| {
      std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
    });

    if let Some(out) = &args.out
    {   config.stage.output_dir = out.clone();
    }
    if let Some(history) = &args.history
    {   config.history_path = Some(history.clone());
    }
    if let Some(model) = &args.model
    {   config.api.model = model.clone();
    }

    config.validate()?;
    Ok(config)
}

fn report(reply: PromptReply)
{   match reply
    {   Ok(report) => match report.run
        {   RunOutcome::Started => info!("Sketch is running")
          , RunOutcome::NothingToRun => info!("No runnable sketch")
          , RunOutcome::Failed(e) => error!("{}", e)
        }
      , Err(e) => error!("{}", e)
    }
}

async fn submit(backend: &SketchBackend, prompt: String)
  -> Result<(), Error>
{   let reply_rx = backend.submit_prompt(prompt)?;
    let reply = reply_rx.await.map_err(|_| {
      Error::Other("Backend dropped the prompt".to_string())
    })?;
    report(reply);
    Ok(())
}

async fn run(args: Args) -> Result<(), Error>
{   let config = load_config(&args)?;
    debug!("Configuration: {:?}", config);

    let history: Box<dyn MessageStore> = match &config.history_path
    {   Some(path) => Box::new(JsonlHistory::new(path.clone()))
      , None => Box::new(NullHistory)
    };
    let user_id = std::env::var("USER")
      .unwrap_or_else(|_| "anonymous".to_string());

    let state = SketchBackendState
    {   client: OpenAiClient::new(&config.api)?
      , api: config.api.clone()
      , policy: RetryPolicy::from_config(&config.retry)?
      , manager: sketchgen::page_runtime_manager(&config.stage)
      , surface: Box::new(LogSurface)
      , identity: Box::new(StaticIdentity::new(user_id))
      , history
    };
    let backend = SketchBackend::new(state);
    info!(
      "Sketches are written to {}",
      config.stage.output_dir.display()
    );

    if let Some(prompt) = args.prompt
    {   submit(&backend, prompt).await?;
        return backend.shutdown().await;
    }

    info!("Describe a sketch and press enter (Ctrl+D to quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await?
    {   let prompt = line.trim();
        if prompt.is_empty()
        {   continue;
        }
        if prompt == "exit" || prompt == "quit"
        {   break;
        }
        submit(&backend, prompt.to_string()).await?;
    }

    backend.shutdown().await
}

#[tokio::main]
async fn main()
{   env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    if let Err(e) = run(Args::parse()).await
    {   error!("{}", e);
        std::process::exit(1);
    }
}
