//! Execution loop scenarios against the in-memory gateway.

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use digit_bot::bot::{BotConfiguration, BotEngine, BotPhase, StartOutcome, StopReason, TradeType};
use digit_bot::broker::messages::{BuyReceipt, ContractUpdate};
use digit_bot::broker::MockGateway;

fn engine() -> (BotEngine<MockGateway>, MockGateway) {
    let gateway = MockGateway::new();
    (BotEngine::new(gateway.clone()), gateway)
}

fn config() -> BotConfiguration {
    BotConfiguration::new("R_100", TradeType::Even, 1, 0, dec!(1))
}

fn confirm(engine: &mut BotEngine<MockGateway>, contract_id: &str, price: Decimal) {
    engine.on_buy_confirmed(&BuyReceipt {
        contract_id: contract_id.to_string(),
        buy_price: price,
        longcode: format!("Win payout if the last digit of R_100 is even ({contract_id})"),
        balance_after: None,
    });
}

fn settle(engine: &mut BotEngine<MockGateway>, contract_id: &str, profit: Decimal) {
    engine.on_contract_settled(&ContractUpdate {
        contract_id: Some(contract_id.to_string()),
        is_sold: true,
        status: Some(if profit > Decimal::ZERO { "won" } else { "lost" }.to_string()),
        profit,
        payout: if profit > Decimal::ZERO { profit * dec!(2) } else { Decimal::ZERO },
        underlying: Some("R_100".to_string()),
        entry_tick: None,
        entry_tick_display_value: None,
        exit_tick: None,
        exit_tick_display_value: None,
    });
}

/// Confirm the latest purchase and settle it with `profit`.
fn play(engine: &mut BotEngine<MockGateway>, gateway: &MockGateway, profit: Decimal) {
    let n = gateway.purchases().len();
    let stake = gateway.stakes()[n - 1];
    let id = format!("c{n}");
    confirm(engine, &id, stake);
    settle(engine, &id, profit);
}

#[test]
fn martingale_doubles_after_losses_and_resets_after_win() {
    let (mut engine, gateway) = engine();
    let mut config = config();
    config.martingale = true;
    config.martingale_multiplier = dec!(2);

    assert_eq!(engine.start(config).unwrap(), StartOutcome::Started { slots: 1 });

    play(&mut engine, &gateway, dec!(-1));
    play(&mut engine, &gateway, dec!(-2));
    play(&mut engine, &gateway, dec!(-4));
    play(&mut engine, &gateway, dec!(7.6));

    assert_eq!(gateway.stakes(), vec![dec!(1), dec!(2), dec!(4), dec!(8), dec!(1)]);

    let state = engine.state();
    assert_eq!(state.runs, 4);
    assert_eq!(state.wins, 1);
    assert_eq!(state.losses, 3);
    assert_eq!(state.total_stake, dec!(15));
    assert_eq!(state.total_profit, dec!(0.6));
    assert!(engine.is_running());
}

#[test]
fn flat_staking_keeps_initial_stake_after_losses() {
    let (mut engine, gateway) = engine();
    engine.start(config()).unwrap();

    play(&mut engine, &gateway, dec!(-1));
    play(&mut engine, &gateway, dec!(-1));

    assert_eq!(gateway.stakes(), vec![dec!(1); 3]);
}

#[test]
fn take_profit_halts_after_threshold_reached() {
    let (mut engine, gateway) = engine();
    let mut config = config();
    config.take_profit = Some(dec!(1.5));
    engine.start(config).unwrap();

    play(&mut engine, &gateway, dec!(0.95));
    assert!(engine.is_running());
    play(&mut engine, &gateway, dec!(0.95));

    assert_eq!(engine.phase(), BotPhase::Stopped(StopReason::TakeProfit));
    assert_eq!(gateway.purchases().len(), 2);
}

#[test]
fn stop_loss_halts_martingale_sequence() {
    let (mut engine, gateway) = engine();
    let mut config = config();
    config.martingale = true;
    config.stop_loss = Some(dec!(5));
    engine.start(config).unwrap();

    play(&mut engine, &gateway, dec!(-1));
    play(&mut engine, &gateway, dec!(-2));
    assert!(engine.is_running());
    play(&mut engine, &gateway, dec!(-4));

    assert_eq!(engine.phase(), BotPhase::Stopped(StopReason::StopLoss));
    assert_eq!(engine.state().total_profit, dec!(-7));
    assert_eq!(gateway.purchases().len(), 3);
}

#[test]
fn bulk_batch_buys_once_and_completes_on_last_settlement() {
    let (mut engine, gateway) = engine();
    let mut config = config();
    config.bulk_trading = true;
    config.bulk_trade_count = 3;

    assert_eq!(engine.start(config).unwrap(), StartOutcome::Started { slots: 3 });
    assert_eq!(gateway.purchases().len(), 3);

    for id in ["b1", "b2", "b3"] {
        confirm(&mut engine, id, dec!(1));
    }
    settle(&mut engine, "b1", dec!(0.95));
    settle(&mut engine, "b2", dec!(-1));
    assert!(engine.is_running());
    settle(&mut engine, "b3", dec!(-1));

    assert_eq!(engine.phase(), BotPhase::Stopped(StopReason::BulkComplete));
    assert_eq!(gateway.purchases().len(), 3);
    assert_eq!(engine.state().total_profit, dec!(-1.05));
}

#[test]
fn stopped_run_still_records_late_settlements() {
    let (mut engine, gateway) = engine();
    engine.start(config()).unwrap();
    confirm(&mut engine, "late", dec!(1));

    assert!(engine.stop());
    settle(&mut engine, "late", dec!(0.95));

    assert_eq!(engine.state().wins, 1);
    assert_eq!(engine.state().total_profit, dec!(0.95));
    assert_eq!(gateway.purchases().len(), 1);
}

#[test]
fn restart_after_clear_begins_fresh() {
    let (mut engine, gateway) = engine();
    let mut config = config();
    config.take_profit = Some(dec!(0.5));
    engine.start(config.clone()).unwrap();
    play(&mut engine, &gateway, dec!(0.95));
    assert!(!engine.is_running());

    engine.clear().unwrap();
    assert_eq!(engine.phase(), BotPhase::Idle);
    assert!(engine.trades().is_empty());

    engine.start(config).unwrap();
    assert_eq!(engine.state().total_profit, Decimal::ZERO);
    assert_eq!(gateway.purchases().len(), 2);
}
