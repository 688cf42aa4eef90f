use lanemap::{Config, ExecutionScope, Mapper};
use std::{convert::Infallible, time::Instant};
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    let rt = match Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        let now = Instant::now();
        let mapper = Mapper::new(config);
        let scope = ExecutionScope::new();
        let inputs: Vec<u64> = (0..1_000_000).collect();

        let result = mapper
            .map(&scope, inputs, |_, x| async move { Ok::<_, Infallible>(x * 2) })
            .await;

        match result {
            Ok(out) => println!("mapped {} items, elapsed: {:?}", out.len(), now.elapsed()),
            Err(err) => eprintln!("mapping failed: {err}"),
        }
    });
}
