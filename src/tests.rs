#[cfg(test)]
mod tests {
	use crate::callbacks::*;
	use crate::engine::*;
	use crate::error::*;
	use crate::forecast::tests::FailingForecaster;
	use crate::memory::*;
	use crate::types::*;
	use async_trait::async_trait;
	use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
	use std::collections::HashMap;
	use std::sync::Arc;
	use std::time::Duration;

	fn init_tracing() {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_test_writer()
			.try_init();
	}

	fn date(y: i32, m: u32, d: u32) -> NaiveDate {
		NaiveDate::from_ymd_opt(y, m, d).unwrap()
	}

	fn noon(day: NaiveDate) -> DateTime<Utc> {
		Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
	}

	/// `per_day` events of `category` on every day of `[start, end]`
	fn daily_events(start: NaiveDate, end: NaiveDate, per_day: usize, category: &str) -> Vec<TimestampedEvent> {
		start
			.iter_days()
			.take_while(|d| *d <= end)
			.flat_map(|day| {
				(0..per_day).map(move |i| {
					TimestampedEvent::new(
						format!("{}-{}-{}", category, day, i),
						noon(day) + ChronoDuration::minutes(i as i64),
						category.to_string(),
					)
				})
			})
			.collect()
	}

	fn fixed_clock() -> Arc<FixedClock> {
		Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap()))
	}

	fn engine_with(events: Vec<TimestampedEvent>, snapshots: Vec<MetricSnapshot>) -> ReportEngine {
		let clock = fixed_clock();
		let callbacks = ReportCallbacks::new(
			Arc::new(InMemoryEventStore::with_events(events)),
			Arc::new(InMemorySnapshotStore::with_snapshots(snapshots)),
			Arc::new(InMemoryCache::with_clock(clock.clone())),
		)
		.with_clock(clock);
		ReportEngine::new(ReportConfig::default(), callbacks).unwrap()
	}

	struct UnreachableEvents;

	#[async_trait]
	impl EventStore for UnreachableEvents {
		async fn count_events_in_range(&self, _: NaiveDate, _: NaiveDate, _: Option<&str>) -> LookoutResult<u64> {
			Err(LookoutError::config("connection reset by peer"))
		}

		async fn count_events_by_day(
			&self,
			_: NaiveDate,
			_: NaiveDate,
			_: Option<&str>,
		) -> LookoutResult<Vec<DailyCount>> {
			Err(LookoutError::config("connection reset by peer"))
		}
	}

	struct UnreachableSnapshots;

	#[async_trait]
	impl SnapshotStore for UnreachableSnapshots {
		async fn list_snapshots(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> LookoutResult<Vec<MetricSnapshot>> {
			Err(LookoutError::upstream("snapshots", "timeout"))
		}
	}

	struct BrokenCache;

	#[async_trait]
	impl CacheStore for BrokenCache {
		async fn get(&self, _key: &str) -> LookoutResult<Option<String>> {
			Err(LookoutError::cache("connection refused"))
		}

		async fn set(&self, _key: &str, _payload: String, _ttl: Duration) -> LookoutResult<()> {
			Err(LookoutError::cache("connection refused"))
		}
	}

	// ===== Ticket report =====

	#[tokio::test]
	async fn test_identical_days_with_forced_model_failure() {
		init_tracing();
		let events = daily_events(date(2025, 2, 1), date(2025, 3, 16), 10, "SUPPORT");
		let engine = engine_with(events, vec![]).with_forecaster(Box::new(FailingForecaster));

		// Mon 03-03..Sun 03-16 against Mon 02-17..Sun 03-02: ten business days each
		let report = engine
			.get_ticket_report(&TicketReportQuery::new("2025-03-03", "2025-03-16"))
			.await
			.unwrap();

		assert_eq!(report.forecast.len(), 7);
		for point in &report.forecast {
			assert_eq!(point.predicted, 10);
			assert_eq!(point.lower_bound, 10);
			assert_eq!(point.upper_bound, 10);
			assert_eq!(point.trend, Trend::Flat);
		}
		assert_eq!(report.variacao, 0.0);
		assert_eq!(report.metadados.working_days, 10);
		assert_eq!(report.metadados.previous_working_days, 10);
		assert_eq!(report.metadados.projection_method, "MOVING_AVERAGE");
		assert_eq!(report.metadados.r2, None);
		assert_eq!(report.metadados.rmse, None);
		assert_eq!(report.forecast[0].period, "2025-03-17");
		assert_eq!(report.forecast[6].period, "2025-03-23");
		assert_eq!(engine.status().await.fallback_forecasts, 1);
	}

	#[tokio::test]
	async fn test_report_views_are_consistent() {
		let mut events = daily_events(date(2025, 1, 1), date(2025, 3, 14), 3, "SUPPORT");
		events.extend(daily_events(date(2025, 3, 3), date(2025, 3, 7), 2, "BILLING"));
		let engine = engine_with(events, vec![]);

		let report = engine
			.get_ticket_report(&TicketReportQuery::new("2025-03-01", "2025-03-14").with_category("BILLING"))
			.await
			.unwrap();

		// Requested history followed by the projection
		assert_eq!(report.data.len(), 14 + 7);
		assert_eq!(report.data[0].date, "2025-03-01");
		assert_eq!(report.data[0].total, Some(0));
		assert_eq!(report.data[2].quantidade_real, Some(2));
		assert!(report.data[14].quantidade_projetada.is_some());
		assert!(report.data[14].total.is_none());

		// Thirty-day window followed by the projection
		assert_eq!(report.historical.len(), 30);
		assert_eq!(report.serie.len(), 30 + 7);
		assert_eq!(report.serie[0].data, "2025-02-13");
		assert_eq!(report.historical.last().unwrap().period, "2025-03-14");

		assert_eq!(report.tickets.len(), 14);
		assert!(report.tickets.iter().all(|t| t.kind == TickerKind::Ticket));
		assert_eq!(report.projections.len(), 7);
		assert!(report.projections.iter().all(|t| t.kind == TickerKind::Projection));

		let meta = &report.metadados;
		assert_eq!(meta.category.as_deref(), Some("BILLING"));
		assert_eq!(meta.start_date, "2025-03-01");
		assert_eq!(meta.last_date, "2025-03-14");
		assert_eq!(meta.ordenacao, "asc");
		assert_eq!(meta.training_window, 23);
		assert_eq!(meta.forecast_horizon, 7);
		assert_eq!(meta.confidence_level, 0.95);
		assert_eq!(meta.cache, CacheInfo { ttl_segundos: 300, hit: false });

		// No BILLING tickets in the previous period
		assert_eq!(report.variacao, 100.0);

		for point in &report.forecast {
			assert!(point.lower_bound <= point.predicted && point.predicted <= point.upper_bound);
		}
	}

	#[tokio::test]
	async fn test_history_sum_matches_range_count() {
		let mut events = daily_events(date(2025, 2, 20), date(2025, 3, 10), 4, "SUPPORT");
		events.extend(daily_events(date(2025, 3, 1), date(2025, 3, 5), 1, "BILLING"));
		let store = InMemoryEventStore::with_events(events.clone());
		let engine = engine_with(events, vec![]);

		let report = engine
			.get_ticket_report(&TicketReportQuery::new("2025-02-25", "2025-03-08"))
			.await
			.unwrap();

		let sum: u64 = report.tickets.iter().map(|t| t.ticker).sum();
		let expected = store
			.count_events_in_range(date(2025, 2, 25), date(2025, 3, 8), None)
			.await
			.unwrap();
		assert_eq!(sum, expected);
		assert_eq!(sum, 12 * 4 + 5);
	}

	#[tokio::test]
	async fn test_inverted_range_is_rejected() {
		let engine = engine_with(vec![], vec![]);
		let err = engine
			.get_ticket_report(&TicketReportQuery::new("2025-02-10", "2025-01-01"))
			.await
			.unwrap_err();
		assert!(matches!(err, LookoutError::InvalidRange { .. }));
		assert_eq!(err.code(), "INVALID_RANGE");
	}

	#[tokio::test]
	async fn test_malformed_dates_are_rejected() {
		let engine = engine_with(vec![], vec![]);
		for (start, end) in [("2025/01/01", "2025-01-10"), ("2025-01-01", "10-01-2025"), ("", "2025-01-10")] {
			let err = engine
				.get_ticket_report(&TicketReportQuery::new(start, end))
				.await
				.unwrap_err();
			assert!(matches!(err, LookoutError::InvalidDateFormat { .. }), "{start} {end}");
		}
	}

	#[tokio::test]
	async fn test_range_limit_is_inclusive() {
		let engine = engine_with(vec![], vec![]);

		// 180 calendar days, inclusive
		assert!(engine
			.get_ticket_report(&TicketReportQuery::new("2025-01-01", "2025-06-29"))
			.await
			.is_ok());

		let err = engine
			.get_ticket_report(&TicketReportQuery::new("2025-01-01", "2025-06-30"))
			.await
			.unwrap_err();
		assert!(matches!(err, LookoutError::RangeTooLarge { days: 181, max_days: 180 }));
	}

	#[tokio::test]
	async fn test_unknown_category_is_rejected() {
		let events = daily_events(date(2025, 3, 1), date(2025, 3, 5), 2, "SUPPORT");
		let engine = engine_with(events, vec![]);
		let err = engine
			.get_ticket_report(&TicketReportQuery::new("2025-03-01", "2025-03-05").with_category("SALES"))
			.await
			.unwrap_err();
		assert!(matches!(err, LookoutError::CategoryNotFound { ref category } if category == "SALES"));
		assert!(err.is_client_error());
	}

	#[tokio::test]
	async fn test_cache_round_trip() {
		let events = daily_events(date(2025, 1, 15), date(2025, 3, 14), 5, "SUPPORT");
		let engine = engine_with(events, vec![]);
		let query = TicketReportQuery::new("2025-03-01", "2025-03-14");

		let first = engine.get_ticket_report(&query).await.unwrap();
		let second = engine.get_ticket_report(&query).await.unwrap();

		assert!(!first.cache_hit());
		assert!(second.cache_hit());

		let mut expected = first.clone();
		expected.metadados.cache.hit = true;
		assert_eq!(second, expected);

		let status = engine.status().await;
		assert_eq!(status.reports_generated, 1);
		assert_eq!(status.cache_hits, 1);
	}

	#[tokio::test]
	async fn test_cache_invalidates_when_window_sum_changes() {
		let clock = fixed_clock();
		let events = Arc::new(InMemoryEventStore::with_events(daily_events(
			date(2025, 2, 1),
			date(2025, 3, 14),
			2,
			"SUPPORT",
		)));
		let callbacks = ReportCallbacks::new(
			events.clone(),
			Arc::new(InMemorySnapshotStore::new()),
			Arc::new(InMemoryCache::with_clock(clock.clone())),
		)
		.with_clock(clock);
		let engine = ReportEngine::new(ReportConfig::default(), callbacks).unwrap();
		let query = TicketReportQuery::new("2025-03-10", "2025-03-14");

		assert!(!engine.get_ticket_report(&query).await.unwrap().cache_hit());
		events
			.insert(TimestampedEvent::new("late", noon(date(2025, 3, 12)), "SUPPORT"))
			.await;
		let refreshed = engine.get_ticket_report(&query).await.unwrap();
		assert!(!refreshed.cache_hit());
		assert_eq!(refreshed.tickets[2].ticker, 3);
	}

	#[tokio::test]
	async fn test_cache_failure_degrades_gracefully() {
		let callbacks = ReportCallbacks::new(
			Arc::new(InMemoryEventStore::with_events(daily_events(
				date(2025, 2, 1),
				date(2025, 3, 14),
				1,
				"SUPPORT",
			))),
			Arc::new(InMemorySnapshotStore::new()),
			Arc::new(BrokenCache),
		)
		.with_clock(fixed_clock());
		let engine = ReportEngine::new(ReportConfig::default(), callbacks).unwrap();
		let query = TicketReportQuery::new("2025-03-01", "2025-03-14");

		let first = engine.get_ticket_report(&query).await.unwrap();
		let second = engine.get_ticket_report(&query).await.unwrap();
		assert!(!first.cache_hit());
		assert!(!second.cache_hit());
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn test_unreadable_events_are_fatal() {
		let callbacks = ReportCallbacks::new(
			Arc::new(UnreachableEvents),
			Arc::new(InMemorySnapshotStore::new()),
			Arc::new(InMemoryCache::new()),
		);
		let engine = ReportEngine::new(ReportConfig::default(), callbacks).unwrap();

		let err = engine
			.get_ticket_report(&TicketReportQuery::new("2025-03-01", "2025-03-14"))
			.await
			.unwrap_err();
		match err {
			LookoutError::UpstreamDataUnavailable { source_name, message } => {
				assert_eq!(source_name, "events");
				assert!(message.contains("connection reset"));
			}
			other => panic!("unexpected error: {other}"),
		}

		// The category check goes through the default `has_category`
		let err = engine
			.get_ticket_report(&TicketReportQuery::new("2025-03-01", "2025-03-14").with_category("SUPPORT"))
			.await
			.unwrap_err();
		assert_eq!(err.code(), "UPSTREAM_DATA_UNAVAILABLE");
	}

	// ===== Snapshot aggregation =====

	fn stats(plans: f64) -> HashMap<String, f64> {
		let mut stats = HashMap::new();
		stats.insert(counters::PLANS.to_string(), plans);
		stats
	}

	fn student_snapshots() -> Vec<MetricSnapshot> {
		let pricing = PricingConfig::default();
		vec![
			MetricSnapshot::from_statistics(Utc.with_ymd_and_hms(2025, 2, 28, 22, 0, 0).unwrap(), &stats(30.0), &pricing),
			MetricSnapshot::from_statistics(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(), &stats(33.0), &pricing),
			MetricSnapshot::from_statistics(Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap(), &stats(36.0), &pricing),
			MetricSnapshot::from_statistics(Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap(), &stats(45.0), &pricing),
		]
	}

	fn two_day_query() -> AggregationQuery {
		AggregationQuery::new(Granularity::Day)
			.start("2025-03-01")
			.end("2025-03-02T23:59:59Z")
	}

	#[tokio::test]
	async fn test_new_students_aggregation() {
		let engine = engine_with(vec![], student_snapshots());
		let points = engine.get_new_students_aggregation(&two_day_query()).await.unwrap();

		assert_eq!(
			points,
			vec![
				NewStudentsPoint {
					period: "2025-03-01".to_string(),
					new_students: 2.0,
					total_students: 12.0,
				},
				NewStudentsPoint {
					period: "2025-03-02".to_string(),
					new_students: 3.0,
					total_students: 15.0,
				},
			]
		);
	}

	#[tokio::test]
	async fn test_students_report_formatting() {
		let engine = engine_with(vec![], student_snapshots());
		let rows = engine.get_students_report(&two_day_query()).await.unwrap();
		assert_eq!(rows.len(), 2);

		let first = &rows[0];
		assert_eq!(first.period, "2025-03-01");
		assert_eq!(first.novos_usuarios, "1");
		assert_eq!(first.usuarios_totais, "12");
		assert_eq!(first.novos_planos, "6");
		assert_eq!(first.planos_totais, "36");
		assert_eq!(first.novos_topicos, "0");
		assert_eq!(first.valor_novos_usuarios, "R$\u{a0}28,40");
		assert_eq!(first.valor_novo, "R$\u{a0}56,80");
		assert_eq!(first.valor_total, "R$\u{a0}340,80");

		let json = serde_json::to_value(first).unwrap();
		assert_eq!(json["novosUsuarios"], "1");
		assert_eq!(json["valorTotal"], "R$\u{a0}340,80");
	}

	#[tokio::test]
	async fn test_aggregated_deltas_never_negative() {
		let snapshots = vec![
			MetricSnapshot::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()).with_counter("plans", 50.0),
			MetricSnapshot::new(Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap()).with_counter("plans", 20.0),
			MetricSnapshot::new(Utc.with_ymd_and_hms(2025, 3, 9, 9, 0, 0).unwrap()).with_counter("plans", 21.0),
			MetricSnapshot::new(Utc.with_ymd_and_hms(2025, 3, 18, 9, 0, 0).unwrap()).with_counter("plans", 5.0),
		];
		let engine = engine_with(vec![], snapshots);

		for granularity in [Granularity::Day, Granularity::Week, Granularity::Month] {
			let aggregates = engine
				.get_aggregated_metrics(&AggregationQuery::new(granularity).start("01/03/2025").end("2025-03-19"))
				.await
				.unwrap();
			assert!(!aggregates.is_empty());
			assert!(aggregates.iter().all(|a| a.new.values().all(|v| *v >= 0.0)), "{granularity}");
		}
	}

	#[tokio::test]
	async fn test_aggregation_defaults_to_clock_range() {
		// Clock is 2025-03-20 09:00 UTC; the daily default starts thirty days earlier
		let snapshots = vec![
			MetricSnapshot::new(Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap()).with_counter("plans", 5.0),
			MetricSnapshot::new(Utc.with_ymd_and_hms(2025, 3, 19, 0, 0, 0).unwrap()).with_counter("plans", 9.0),
		];
		let engine = engine_with(vec![], snapshots);

		let aggregates = engine
			.get_aggregated_metrics(&AggregationQuery::new(Granularity::Day))
			.await
			.unwrap();
		assert_eq!(aggregates.len(), 31);
		assert_eq!(aggregates[0].period, "2025-02-18");
		assert_eq!(aggregates[0].total_of("plans"), 5.0);
		assert_eq!(aggregates[29].new_of("plans"), 4.0);
		assert_eq!(engine.status().await.aggregations_served, 1);
	}

	#[tokio::test]
	async fn test_aggregation_without_data_is_empty() {
		let engine = engine_with(vec![], vec![]);
		let aggregates = engine
			.get_aggregated_metrics(&AggregationQuery::new(Granularity::Month))
			.await
			.unwrap();
		assert!(aggregates.is_empty());
	}

	#[tokio::test]
	async fn test_aggregation_rejects_bad_bounds() {
		let engine = engine_with(vec![], student_snapshots());
		let err = engine
			.get_aggregated_metrics(&AggregationQuery::new(Granularity::Day).start("2025-03-05").end("2025-03-01"))
			.await
			.unwrap_err();
		assert!(matches!(err, LookoutError::InvalidRange { .. }));

		let err = engine
			.get_aggregated_metrics(&AggregationQuery::new(Granularity::Day).start("last tuesday"))
			.await
			.unwrap_err();
		assert!(matches!(err, LookoutError::InvalidDateFormat { .. }));
	}

	#[tokio::test]
	async fn test_unreadable_snapshots_are_fatal() {
		let callbacks = ReportCallbacks::new(
			Arc::new(InMemoryEventStore::new()),
			Arc::new(UnreachableSnapshots),
			Arc::new(InMemoryCache::new()),
		);
		let engine = ReportEngine::new(ReportConfig::default(), callbacks).unwrap();
		let err = engine.get_aggregated_metrics(&two_day_query()).await.unwrap_err();
		assert!(matches!(err, LookoutError::UpstreamDataUnavailable { ref source_name, .. } if source_name == "snapshots"));
	}

	#[test]
	fn test_engine_rejects_invalid_config() {
		let callbacks = ReportCallbacks::new(
			Arc::new(InMemoryEventStore::new()),
			Arc::new(InMemorySnapshotStore::new()),
			Arc::new(InMemoryCache::new()),
		);
		let config = ReportConfig::builder().history_window(0).build();
		assert!(matches!(ReportEngine::new(config, callbacks), Err(LookoutError::Config { .. })));
	}

	#[test]
	fn test_report_blocking_call() {
		let engine = engine_with(daily_events(date(2025, 3, 1), date(2025, 3, 7), 1, "SUPPORT"), vec![]);
		let report = tokio_test::block_on(engine.get_ticket_report(&TicketReportQuery::new("2025-03-01", "2025-03-07")))
			.unwrap();
		assert_eq!(report.tickets.iter().map(|t| t.ticker).sum::<u64>(), 7);
	}
}
