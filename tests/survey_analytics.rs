use feedback_services::models::Cell;
use feedback_services::services::analytics::{
    aggregator::unique_dates, AggregateOptions, ColumnRole, ColumnRoleResolver, CorrelationMode,
    DateRange, Figure, MetricAggregator, ResolveOptions,
};
use feedback_services::services::file_processor::{parse_dataset, SourceFormat};

const SURVEY: &str = "\
Survey Date,NPS Score,Delivery Speed,Courier Attitude,Comment
2024-01-03,9,5,4,fast delivery
2024-01-10,9,5,5,great
2024-01-15,3,5,4,late again
2024-02-01,7,1,2,
2024-02-11,10,3,5,ok
2024-02-20,2,,1,broken box
,,,,
";

fn survey() -> feedback_services::models::Dataset {
    parse_dataset(SURVEY.as_bytes(), SourceFormat::Csv).expect("survey parses")
}

#[test]
fn roles_are_resolved_from_headers_and_values() {
    let dataset = survey();
    assert_eq!(dataset.row_count(), 6);

    let roles = ColumnRoleResolver::default().resolve_dataset(&dataset);
    assert_eq!(roles.nps, Some(1));
    assert_eq!(roles.date, Some(0));
    assert_eq!(roles.likert.as_slice(), &[2, 3]);
    assert_eq!(
        roles.roles(),
        vec![
            ColumnRole::Date,
            ColumnRole::Nps,
            ColumnRole::Likert,
            ColumnRole::Likert,
            ColumnRole::Unclassified,
        ]
    );
}

#[test]
fn full_summary_over_the_survey() {
    let dataset = survey();
    let roles = ColumnRoleResolver::default().resolve_dataset(&dataset);
    let summary = MetricAggregator::default().aggregate(&dataset, &roles);

    assert!(!summary.date_filter_applied);
    assert_eq!(summary.nps.total, 6);
    assert_eq!(summary.nps.promoters, 3);
    assert_eq!(summary.nps.detractors, 2);
    assert_eq!(summary.nps.passives, 1);
    assert_eq!(summary.nps.score.to_string(), "16.67");

    let speed = &summary.likert[0];
    assert_eq!(speed.column, "Delivery Speed");
    assert_eq!(speed.total, 5);
    assert_eq!(speed.average.to_string(), "3.80");
    assert_eq!(speed.satisfaction_pct.to_string(), "60.0");

    // Speed has a blank cell, so its sample is shorter than the NPS one.
    assert_eq!(summary.correlations[0].coefficient, Figure::NotAvailable);
    assert!(summary.correlations[1].coefficient.is_available());
}

#[test]
fn paired_correlation_uses_rows_valid_for_both() {
    let dataset = survey();
    let roles = ColumnRoleResolver::default().resolve_dataset(&dataset);
    let summary = MetricAggregator::new(AggregateOptions {
        correlation_mode: CorrelationMode::Paired,
        ..AggregateOptions::default()
    })
    .aggregate(&dataset, &roles);
    assert!(summary.correlations[0].coefficient.is_available());
}

#[test]
fn date_window_limits_every_metric() {
    let dataset = survey();
    let roles = ColumnRoleResolver::default().resolve_dataset(&dataset);
    let summary = MetricAggregator::new(AggregateOptions {
        date_range: Some(DateRange::new("2024-01-01", "2024-01-31")),
        ..AggregateOptions::default()
    })
    .aggregate(&dataset, &roles);

    assert!(summary.date_filter_applied);
    assert_eq!(summary.rows_considered, 3);
    assert_eq!(summary.nps.total, 3);
    assert_eq!(summary.likert[0].average.to_string(), "5.00");
}

#[test]
fn dates_are_listed_once_each() {
    let dataset = survey();
    let roles = ColumnRoleResolver::default().resolve_dataset(&dataset);
    let dates = unique_dates(&dataset, &roles);
    assert_eq!(dates.len(), 6);
    assert_eq!(dates.first().map(String::as_str), Some("2024-01-03"));
}

#[test]
fn missing_nps_column_degrades_gracefully() {
    let csv = "Speed,Comment\n4,good\n5,great\n";
    let dataset = parse_dataset(csv.as_bytes(), SourceFormat::Csv).unwrap();
    let roles = ColumnRoleResolver::default().resolve_dataset(&dataset);
    let summary = MetricAggregator::default().aggregate(&dataset, &roles);

    assert_eq!(summary.nps.column, None);
    assert_eq!(summary.nps.score.to_string(), "0.00");
    assert_eq!(summary.nps.average.to_string(), "N/A");
    assert_eq!(summary.correlations[0].coefficient, Figure::NotAvailable);
}

#[test]
fn strict_likert_detection_skips_empty_columns() {
    let csv = "NPS,Notes,Speed\n9,,4\n6,,5\n";
    let dataset = parse_dataset(csv.as_bytes(), SourceFormat::Csv).unwrap();

    let lenient = ColumnRoleResolver::default().resolve_dataset(&dataset);
    assert_eq!(lenient.likert.as_slice(), &[1, 2]);

    let strict = ColumnRoleResolver::new(ResolveOptions {
        likert_requires_values: true,
    })
    .resolve_dataset(&dataset);
    assert_eq!(strict.likert.as_slice(), &[2]);
    assert_eq!(dataset.cell(0, 1), &Cell::Empty);
}
