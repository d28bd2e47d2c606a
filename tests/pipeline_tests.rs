//! End-to-end tests for the signal pipeline

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use daytrader::backtesting::Backtester;
    use daytrader::features::{IndicatorEngine, SignalInputs};
    use daytrader::levels::{detect_levels, ProximityCheck};
    use daytrader::strategy::{ProximityMode, RuleSet, SignalClassifier, StrategyConfig};
    use daytrader::types::{Bar, Interval, LevelKind, RawBar, Series, SignalLabel};
    use daytrader::{AnalysisConfig, Pipeline, PipelineError};

    fn bar(i: usize, close: f64, spread: f64, volume: f64) -> Bar {
        Bar {
            timestamp: Utc.timestamp_opt(1_709_283_600 + i as i64 * 900, 0).unwrap(),
            open: close,
            high: close + spread,
            low: close - spread,
            close,
            volume,
        }
    }

    fn series_from(closes: &[f64]) -> Series {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| bar(i, *c, 0.25, 1_000.0))
            .collect();
        Series::from_bars("TEST", Interval::Min15, bars).unwrap()
    }

    fn noisy_series(n: usize) -> Series {
        let bars = (0..n)
            .map(|i| {
                let x = i as f64;
                let close = 100.0 + (x * 0.21).sin() * 4.0 + (x * 0.05).cos() * 2.0;
                let volume = if i % 7 == 0 { 4_000.0 } else { 1_000.0 + (i % 5) as f64 * 50.0 };
                bar(i, close, 0.3 + (x * 0.4).sin().abs() * 0.2, volume)
            })
            .collect();
        Series::from_bars("NOISY", Interval::Min15, bars).unwrap()
    }

    fn row(bar_index: usize, close: f64, rsi: f64, trend: f64) -> SignalInputs {
        SignalInputs {
            bar_index,
            timestamp: Utc.timestamp_opt(1_709_283_600 + bar_index as i64 * 900, 0).unwrap(),
            close,
            volume: 1_000.0,
            rsi,
            ema_fast: 100.0 + trend,
            ema_slow: 100.0,
            macd: trend,
            macd_signal: 0.0,
            vwap: close,
            volume_sma: 1_000.0,
            volume_spike: false,
        }
    }

    // ============================================================================
    // Warm-up and input validation
    // ============================================================================

    #[test]
    fn test_flat_series_has_no_signal() {
        let series = series_from(&[100.0; 30]);
        let report = Pipeline::default().run(&series).unwrap();

        assert_eq!(report.indicators.rows().len(), 30);
        assert!(report.levels.is_empty());
        assert!(report.signals.is_empty());
        assert!(report.trades.is_empty());
        assert_eq!(report.metrics.win_rate, None);
        assert!(matches!(
            report.latest_signal(),
            Err(PipelineError::EmptySeries)
        ));
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let series = series_from(&[100.0; 20]);
        let err = Pipeline::default().run(&series).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData {
                required: 26,
                available: 20
            }
        ));
    }

    #[test]
    fn test_missing_rows_are_dropped_before_analysis() {
        let mut raw: Vec<RawBar> = (0..40).map(|i| bar(i, 100.0, 0.2, 500.0).into()).collect();
        raw[5].close = None;
        raw[6].volume = Some(f64::NAN);

        let series = Series::new("GAPS", Interval::Min5, &raw).unwrap();
        assert_eq!(series.len(), 38);
        assert!(Pipeline::default().run(&series).is_ok());
    }

    #[test]
    fn test_unordered_bars_rejected() {
        let mut bars: Vec<Bar> = (0..5).map(|i| bar(i, 100.0, 0.2, 500.0)).collect();
        bars.swap(2, 3);
        let err = Series::from_bars("BAD", Interval::Min5, bars).unwrap_err();
        assert!(matches!(err, PipelineError::UnorderedBars { index: 3 }));
    }

    // ============================================================================
    // Levels
    // ============================================================================

    #[test]
    fn test_v_shape_yields_single_support() {
        let closes: Vec<f64> = (0..41).map(|i| 100.0 + (i as f64 - 20.0).abs()).collect();
        let report = Pipeline::default().run(&series_from(&closes)).unwrap();

        assert_eq!(report.levels.len(), 1);
        assert_eq!(report.levels[0].kind, LevelKind::Support);
        assert_eq!(report.levels[0].bar_index, 20);
        assert_eq!(report.levels[0].price, 99.75);
    }

    #[test]
    fn test_inverted_v_yields_single_resistance() {
        let closes: Vec<f64> = (0..21).map(|i| 100.0 - (i as f64 - 10.0).abs()).collect();
        let levels = detect_levels(series_from(&closes).bars(), 3).unwrap();

        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].kind, LevelKind::Resistance);
        assert_eq!(levels[0].bar_index, 10);
        assert_eq!(levels[0].price, 100.25);
    }

    // ============================================================================
    // Classifier and backtest
    // ============================================================================

    #[test]
    fn test_base_rule_round_trip_trade() {
        let classifier = SignalClassifier::new(StrategyConfig {
            rule_set: RuleSet::Base,
            ..Default::default()
        });
        let rows = vec![
            row(40, 98.0, 25.0, 0.5),
            row(41, 99.0, 45.0, 0.5),
            row(42, 103.0, 75.0, -0.5),
            row(43, 101.0, 80.0, -0.5),
        ];
        let signals = classifier.classify(&rows, &[]).unwrap();
        let labels: Vec<SignalLabel> = signals.iter().map(|s| s.label).collect();
        assert_eq!(
            labels,
            vec![
                SignalLabel::Buy,
                SignalLabel::None,
                SignalLabel::Sell,
                SignalLabel::Sell
            ]
        );

        let mut backtester = Backtester::new();
        let metrics = backtester.run(&signals).clone();
        let trades = backtester.get_trades();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].entry_price, 98.0);
        assert_eq!(trades[0].exit_price, 103.0);
        assert_eq!(trades[0].pnl, 5.0);
        assert_eq!(metrics.wins, 1);
        assert_eq!(metrics.to_string(), "Wins: 1 | Losses: 0 | Win Rate: 100.00%");
    }

    #[test]
    fn test_pipeline_invariants_hold_for_every_configuration() {
        let series = noisy_series(400);

        for rule_set in [RuleSet::Base, RuleSet::Extended] {
            for proximity_mode in [ProximityMode::PerBar, ProximityMode::LastClose] {
                let config = AnalysisConfig {
                    strategy: StrategyConfig {
                        rule_set,
                        proximity_mode,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let report = Pipeline::new(config).run(&series).unwrap();
                let ready = report.indicators.ready_rows();

                // One signal per analysable bar, in order
                assert_eq!(report.signals.len(), ready.len());
                assert!(report
                    .signals
                    .iter()
                    .zip(&ready)
                    .all(|(s, r)| s.bar_index == r.bar_index && s.close == r.close));

                for r in &ready {
                    assert!((0.0..=100.0).contains(&r.rsi));
                }

                let buys = report.buy_signals().count();
                assert!(report.trades.len() <= buys);
                for trade in &report.trades {
                    assert!(trade.exit_time > trade.entry_time);
                    assert!((trade.pnl - (trade.exit_price - trade.entry_price)).abs() < 1e-12);
                }
                assert_eq!(report.metrics.total_trades, report.trades.len());
                assert_eq!(
                    report.metrics.wins + report.metrics.losses,
                    report.trades.len()
                );

                let latest = report.latest_signal().unwrap();
                assert_eq!(latest.timestamp, series.last().timestamp);
                assert_eq!(Some(latest.label), report.signals.last().map(|s| s.label));
            }
        }
    }

    #[test]
    fn test_per_bar_labels_only_use_bars_seen_so_far() {
        let series = noisy_series(300);
        let sensitivity = 3;
        let strategy = StrategyConfig::default();
        assert_eq!(strategy.proximity_mode, ProximityMode::PerBar);

        let report = Pipeline::default().run(&series).unwrap();
        let classifier = SignalClassifier::new(strategy.clone());
        let ready = report.indicators.ready_rows();

        for (signal, row) in report.signals.iter().zip(&ready) {
            let seen = &series.bars()[..=signal.bar_index];
            let known = detect_levels(seen, sensitivity).unwrap();
            let proximity = ProximityCheck::evaluate(row.close, &known, strategy.proximity_band);
            assert_eq!(
                signal.label,
                classifier.label(row, proximity),
                "bar {} used a level confirmed later",
                signal.bar_index
            );
        }
        for level in &report.levels {
            assert_eq!(level.confirmed_index, level.bar_index + sensitivity);
        }
    }

    #[test]
    fn test_indicator_frame_covers_every_bar() {
        let series = noisy_series(120);
        let frame = IndicatorEngine::default().compute(&series).unwrap();

        assert_eq!(frame.rows().len(), 120);
        assert!(frame.rows()[..33].iter().all(|r| r.macd_signal.is_none()));
        assert!(frame.rows()[33..].iter().all(|r| r.to_inputs().is_some()));
        assert!(frame.rows()[..19].iter().all(|r| !r.volume_spike));
    }
}
