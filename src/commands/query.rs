//! Read-only commands: list positions and orders

use anyhow::Result;
use std::path::PathBuf;

use super::Session;

pub async fn positions(config: Option<PathBuf>) -> Result<()> {
    let session = Session::start(config).await?;
    {
        let store = session.executor.store().lock();
        let open: Vec<_> = store
            .get_positions()
            .into_iter()
            .filter(|position| position.is_open())
            .collect();

        if open.is_empty() {
            println!("No open positions");
        } else {
            println!(
                "{:<16} {:<6} {:>18} {:>18} {:>14} {:>6}",
                "SYMBOL", "SIDE", "AMOUNT", "ENTRY", "UPNL", "LEV"
            );
            for position in open {
                println!(
                    "{:<16} {:<6} {:>18} {:>18} {:>14} {:>6}",
                    position.symbol.as_str(),
                    position.side.as_str(),
                    position.amount.to_string(),
                    position.entry_price.to_string(),
                    position.unrealized_pnl.to_string(),
                    position.leverage.to_string()
                );
            }
        }
    }
    session.finish().await;
    Ok(())
}

pub async fn orders(config: Option<PathBuf>) -> Result<()> {
    let session = Session::start(config).await?;
    {
        let store = session.executor.store().lock();
        let orders = store.get_all_orders();

        if orders.is_empty() {
            println!("No orders");
        } else {
            println!(
                "{:<24} {:<16} {:<5} {:<7} {:<10} {:>16} {:>16}",
                "ORDER ID", "SYMBOL", "SIDE", "TYPE", "STATUS", "AMOUNT", "FILLED"
            );
            for order in orders {
                println!(
                    "{:<24} {:<16} {:<5} {:<7} {:<10} {:>16} {:>16}",
                    order.id,
                    order.symbol.as_str(),
                    order.side.as_str(),
                    order.order_type.as_str(),
                    format!("{:?}", order.status),
                    order.amount.to_string(),
                    order.filled_amount.to_string()
                );
            }
        }
    }
    session.finish().await;
    Ok(())
}
