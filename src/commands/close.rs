//! Trade execution commands

use anyhow::Result;
use crypto_oms::executor::CloseOutcome;
use crypto_oms::oms::PositionSide;
use crypto_oms::{CloseRequest, Money, Symbol};
use std::path::PathBuf;
use tracing::info;

use super::Session;

fn print_outcome(outcome: &CloseOutcome) {
    println!(
        "{} {} {} reduce-only market (client id {}, exchange id {})",
        outcome.side,
        outcome.amount,
        outcome.symbol,
        outcome.client_order_id,
        outcome.exchange_order_id.as_deref().unwrap_or("-")
    );
}

pub async fn flash_close(
    config: Option<PathBuf>,
    symbol: String,
    side: PositionSide,
    force: bool,
) -> Result<()> {
    let symbol = Symbol::new(symbol.to_uppercase());
    info!("Flash closing {} {} (force: {})", symbol, side, force);

    let session = Session::start(config).await?;
    let result = session
        .executor
        .flash_close_position(&symbol, side, force)
        .await;
    session.finish().await;

    print_outcome(&result?);
    Ok(())
}

pub async fn close(
    config: Option<PathBuf>,
    symbol: String,
    side: PositionSide,
    amount: Option<Money>,
    force_full: bool,
) -> Result<()> {
    let symbol = Symbol::new(symbol.to_uppercase());
    let mut request = match amount {
        Some(amount) => CloseRequest::partial(symbol, side, amount),
        None => CloseRequest::full(symbol, side),
    };
    if force_full {
        request = request.forced();
    }
    info!("Closing {:?}", request);

    let session = Session::start(config).await?;
    let result = session.executor.close_position(request).await;
    session.finish().await;

    print_outcome(&result?);
    Ok(())
}

pub async fn cancel_all(config: Option<PathBuf>, symbol: String) -> Result<()> {
    let symbol = Symbol::new(symbol.to_uppercase());

    let session = Session::start(config).await?;
    let result = session.executor.cancel_all_orders(&symbol, true).await;
    session.finish().await;

    result?;
    println!("Cancelled all working orders on {}", symbol);
    Ok(())
}

pub async fn close_all(config: Option<PathBuf>) -> Result<()> {
    let session = Session::start(config).await?;
    let result = session.executor.close_all_positions().await;
    session.finish().await;

    let outcomes = result?;
    if outcomes.is_empty() {
        println!("No open positions");
    }
    for outcome in &outcomes {
        print_outcome(outcome);
    }
    Ok(())
}
