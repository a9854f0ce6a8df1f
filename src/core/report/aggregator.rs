//! Joins load and validation results into a [`RunReport`]

use super::model::{exit_code, EntityReport, RunReport, ServiceReport, ServiceSummary, Status};
use crate::core::load::{LoadResult, ServiceLoadReport, ServiceLoadStatus};
use crate::core::validation::{ServiceValidationReport, ValidationResult, ValidationStatus};
use crate::domain::{DatasetId, ServiceDescriptor, ServiceName, TableId};
use chrono::Utc;
use std::collections::BTreeMap;

#[derive(Default)]
struct ServiceEntry {
    dataset: Option<DatasetId>,
    load_status: Option<ServiceLoadStatus>,
    errors: Vec<String>,
    entities: BTreeMap<TableId, EntityReport>,
}

impl ServiceEntry {
    fn entity(&mut self, table: &TableId) -> &mut EntityReport {
        self.entities
            .entry(table.clone())
            .or_insert_with(|| EntityReport::new(table.clone()))
    }
}

/// Collects phase results in any order and produces the run report
///
/// Results are joined by service name and canonical table id. Output is
/// sorted, so arrival order never shows in the report.
#[derive(Default)]
pub struct ReportAggregator {
    run_date: String,
    services: BTreeMap<ServiceName, ServiceEntry>,
}

impl ReportAggregator {
    pub fn new(run_date: impl Into<String>) -> Self {
        Self {
            run_date: run_date.into(),
            services: BTreeMap::new(),
        }
    }

    /// Registers the services of the run so their datasets are known
    pub fn with_services(mut self, services: &[ServiceDescriptor]) -> Self {
        for service in services {
            let entry = self.services.entry(service.name.clone()).or_default();
            entry.dataset = Some(service.dataset.clone());
        }
        self
    }

    pub fn add_load_report(&mut self, report: ServiceLoadReport) {
        let entry = self.services.entry(report.service).or_default();
        entry.load_status = Some(report.status);
        if let Some(error) = report.error {
            entry.errors.push(error);
        }
        for result in report.entities {
            let table = result.table.clone();
            entry.entity(&table).load = Some(result);
        }
    }

    pub fn add_load_result(&mut self, service: &ServiceName, result: LoadResult) {
        let entry = self.services.entry(service.clone()).or_default();
        let table = result.table.clone();
        entry.entity(&table).load = Some(result);
    }

    pub fn add_validation_report(&mut self, report: ServiceValidationReport) {
        let entry = self.services.entry(report.service).or_default();
        if let Some(error) = report.error {
            entry.errors.push(error);
        }
        for result in report.entities {
            let table = result.table.clone();
            entry.entity(&table).validation = Some(result);
        }
    }

    pub fn add_validation_result(&mut self, service: &ServiceName, result: ValidationResult) {
        let entry = self.services.entry(service.clone()).or_default();
        let table = result.table.clone();
        entry.entity(&table).validation = Some(result);
    }

    /// Builds the report; services that produced nothing are left out
    pub fn finish(self, interrupted: bool) -> RunReport {
        let services = self
            .services
            .into_iter()
            .filter(|(_, entry)| {
                entry.load_status.is_some() || !entry.errors.is_empty() || !entry.entities.is_empty()
            })
            .map(|(name, entry)| {
                let error = (!entry.errors.is_empty()).then(|| entry.errors.join("; "));
                ServiceReport {
                    service: name,
                    dataset: entry.dataset,
                    status: Status::Success,
                    load_status: entry.load_status,
                    error,
                    summary: ServiceSummary::default(),
                    entities: entry.entities.into_values().collect(),
                }
            })
            .collect();

        let mut report = RunReport {
            run_date: self.run_date,
            generated_at: Utc::now(),
            status: Status::Success,
            exit_code: exit_code::SUCCESS,
            interrupted,
            services,
        };
        recompute(&mut report);
        report
    }
}

/// Recomputes summaries, statuses and the exit code from the entity entries
pub fn recompute(report: &mut RunReport) {
    let mut failures = false;
    for service in &mut report.services {
        service.entities.sort_by(|a, b| a.table.cmp(&b.table));
        service.summary = summarize(service);
        service.status = service_status(service);
        failures |= has_failures(service);
    }
    report.services.sort_by(|a, b| a.service.cmp(&b.service));

    report.status = report
        .services
        .iter()
        .map(|s| s.status)
        .max()
        .unwrap_or(Status::Success);
    report.exit_code = if report.interrupted {
        exit_code::INTERRUPTED
    } else if failures {
        exit_code::FAILURES
    } else {
        exit_code::SUCCESS
    };
}

/// Folds a targeted rerun into the previous report
///
/// Only `table` of `service` is replaced; every other entry of `previous` is
/// kept as is. A service absent from `previous` is copied over whole.
pub fn merge_rerun(
    mut previous: RunReport,
    current: RunReport,
    service: &ServiceName,
    table: &TableId,
) -> RunReport {
    let Some(rerun) = current.services.into_iter().find(|s| &s.service == service) else {
        previous.generated_at = current.generated_at;
        previous.interrupted = current.interrupted;
        recompute(&mut previous);
        return previous;
    };

    match previous.services.iter_mut().find(|s| &s.service == service) {
        Some(existing) => {
            if let Some(entity) = rerun.entities.into_iter().find(|e| &e.table == table) {
                match existing.entities.iter_mut().find(|e| &e.table == table) {
                    Some(slot) => *slot = entity,
                    None => {
                        let at = existing
                            .entities
                            .partition_point(|e| e.table < entity.table);
                        existing.entities.insert(at, entity);
                    }
                }
            }
            existing.error = rerun.error;
            existing.load_status = match (rerun.load_status, existing.load_status) {
                (Some(ServiceLoadStatus::Failed), _) => Some(ServiceLoadStatus::Failed),
                (None, None) => None,
                _ => Some(load_status_of(&existing.entities)),
            };
            if existing.dataset.is_none() {
                existing.dataset = rerun.dataset;
            }
        }
        None => previous.services.push(rerun),
    }

    previous.generated_at = current.generated_at;
    previous.interrupted = current.interrupted;
    recompute(&mut previous);
    previous
}

/// Folds a service-wide rerun into the previous report
///
/// The rerun's entry for `service` replaces the previous one; other services
/// are kept as is.
pub fn merge_service_rerun(
    mut previous: RunReport,
    current: RunReport,
    service: &ServiceName,
) -> RunReport {
    if let Some(rerun) = current.services.into_iter().find(|s| &s.service == service) {
        match previous.services.iter_mut().find(|s| &s.service == service) {
            Some(existing) => *existing = rerun,
            None => previous.services.push(rerun),
        }
    }
    previous.generated_at = current.generated_at;
    previous.interrupted = current.interrupted;
    recompute(&mut previous);
    previous
}

fn load_status_of(entities: &[EntityReport]) -> ServiceLoadStatus {
    let loads: Vec<&LoadResult> = entities.iter().filter_map(|e| e.load.as_ref()).collect();
    if loads.is_empty() {
        ServiceLoadStatus::Empty
    } else if loads.iter().any(|l| l.outcome.is_failed()) {
        ServiceLoadStatus::PartiallyFailed
    } else {
        ServiceLoadStatus::Completed
    }
}

fn summarize(service: &ServiceReport) -> ServiceSummary {
    let mut summary = ServiceSummary {
        all_entities_processed: service.error.is_none() && !service.entities.is_empty(),
        ..Default::default()
    };

    for entity in &service.entities {
        let validation = entity.validation.as_ref();
        let completeness = validation.and_then(|v| v.completeness.as_ref());

        if let Some(c) = completeness {
            summary.total_source_rows += c.source_rows;
            summary.total_destination_rows += c.destination_rows;
        } else if let Some(rows) = entity.load.as_ref().and_then(|l| l.destination_rows) {
            summary.total_destination_rows += rows;
        }

        let exists = match validation {
            Some(v) => v.destination_exists,
            None => entity.load.as_ref().is_some_and(|l| !l.outcome.is_failed()),
        };
        if let Some(v) = validation {
            if v.status != ValidationStatus::Error && !v.destination_exists {
                summary.missing_entities.push(entity.table.clone());
            }
            if v.is_mismatch() && v.destination_exists {
                summary.mismatched_entities.push(entity.table.clone());
            }
        }
        if !exists || entity.load_failed() {
            summary.all_entities_processed = false;
        }
    }
    summary
}

fn service_status(service: &ServiceReport) -> Status {
    let failed = service.error.is_some()
        || service.entities.iter().any(|e| {
            e.load_failed()
                || e
                    .validation
                    .as_ref()
                    .is_some_and(|v| v.status == ValidationStatus::Error)
        });
    if failed {
        return Status::Failed;
    }
    let mismatch = service
        .entities
        .iter()
        .any(|e| e.validation.as_ref().is_some_and(|v| v.is_mismatch()));
    if mismatch {
        Status::Warning
    } else {
        Status::Success
    }
}

fn has_failures(service: &ServiceReport) -> bool {
    service.error.is_some()
        || service.entities.iter().any(|e| {
            e.load_failed()
                || e
                    .validation
                    .as_ref()
                    .is_some_and(|v| v.status != ValidationStatus::Success)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::load::LoadOutcome;
    use crate::core::validation::CompletenessResult;

    fn service(name: &str) -> ServiceName {
        ServiceName::new(name).unwrap()
    }

    fn table(name: &str) -> TableId {
        TableId::new(name).unwrap()
    }

    fn checked(name: &str, source_rows: u64, destination_rows: u64) -> ValidationResult {
        let matches = source_rows == destination_rows;
        ValidationResult {
            table: table(name),
            status: if matches {
                ValidationStatus::Success
            } else {
                ValidationStatus::Failed
            },
            destination_exists: true,
            completeness: Some(CompletenessResult {
                source_rows,
                destination_rows,
                destination_exists: true,
                matches,
            }),
            correctness: None,
            error: None,
        }
    }

    fn loaded(name: &str, rows: u64) -> LoadResult {
        LoadResult::success(table(name), LoadOutcome::Created, 1, Some(rows))
    }

    #[test]
    fn test_success_scenario() {
        let mut aggregator = ReportAggregator::new("2025-01-15");
        let billing = service("billing");
        // validation results may arrive before load results
        aggregator.add_validation_result(&billing, checked("users", 100, 100));
        aggregator.add_load_result(&billing, loaded("orders", 50));
        aggregator.add_load_result(&billing, loaded("users", 100));
        aggregator.add_validation_result(&billing, checked("orders", 50, 50));

        let report = aggregator.finish(false);
        assert_eq!(report.status, Status::Success);
        assert_eq!(report.exit_code, exit_code::SUCCESS);

        let billing = &report.services[0];
        assert_eq!(billing.entities[0].table.as_str(), "orders");
        assert_eq!(billing.summary.total_source_rows, 150);
        assert_eq!(billing.summary.total_destination_rows, 150);
        assert!(billing.summary.all_entities_processed);
    }

    #[test]
    fn test_service_reports_join_by_table() {
        let mut aggregator = ReportAggregator::new("2025-01-15");
        let billing = service("billing");
        aggregator.add_load_report(ServiceLoadReport::from_results(
            billing.clone(),
            vec![loaded("users", 100), loaded("orders", 50)],
        ));
        aggregator.add_validation_report(ServiceValidationReport::from_results(
            billing,
            vec![checked("orders", 50, 50), checked("users", 100, 100)],
        ));

        let report = aggregator.finish(false);
        let billing = &report.services[0];
        assert_eq!(billing.load_status, Some(ServiceLoadStatus::Completed));
        assert_eq!(billing.entities.len(), 2);
        for entity in &billing.entities {
            assert_eq!(entity.load.as_ref().unwrap().table, entity.table);
            assert_eq!(entity.validation.as_ref().unwrap().table, entity.table);
        }
        assert_eq!(report.exit_code, exit_code::SUCCESS);
    }

    #[test]
    fn test_row_count_mismatch_is_warning_with_failure_exit() {
        let mut aggregator = ReportAggregator::new("2025-01-15");
        let billing = service("billing");
        aggregator.add_load_result(&billing, loaded("users", 100));
        aggregator.add_validation_result(&billing, checked("users", 99, 100));

        let report = aggregator.finish(false);
        assert_eq!(report.services[0].status, Status::Warning);
        assert_eq!(report.status, Status::Warning);
        assert_eq!(report.exit_code, exit_code::FAILURES);
        assert_eq!(report.services[0].summary.mismatched_entities, vec![table("users")]);
    }

    #[test]
    fn test_status_precedence() {
        let mut aggregator = ReportAggregator::new("2025-01-15");
        let a = service("a_service");
        let b = service("b_service");
        aggregator.add_validation_result(&a, checked("users", 1, 2));
        aggregator.add_load_result(&b, LoadResult::failed(table("orders"), 3, "Server error"));
        aggregator.add_validation_result(&b, checked("orders", 5, 5));

        let report = aggregator.finish(false);
        assert_eq!(report.services[0].status, Status::Warning);
        assert_eq!(report.services[1].status, Status::Failed);
        assert_eq!(report.status, Status::Failed);
        assert!(!report.services[1].summary.all_entities_processed);
    }

    #[test]
    fn test_validation_error_and_discovery_failure() {
        let mut aggregator = ReportAggregator::new("2025-01-15");
        aggregator.add_validation_result(
            &service("billing"),
            ValidationResult::error(table("users"), true, "Connection failed"),
        );
        aggregator.add_load_report(ServiceLoadReport::failed(service("claims"), "Discovery error"));

        let report = aggregator.finish(false);
        assert!(report.services.iter().all(|s| s.status == Status::Failed));
        assert_eq!(report.exit_code, exit_code::FAILURES);
        assert_eq!(report.services[1].load_status, Some(ServiceLoadStatus::Failed));
    }

    #[test]
    fn test_missing_destination_table() {
        let mut aggregator = ReportAggregator::new("2025-01-15");
        let mut missing = checked("users", 10, 0);
        missing.destination_exists = false;
        aggregator.add_validation_result(&service("billing"), missing);

        let report = aggregator.finish(false);
        let summary = &report.services[0].summary;
        assert_eq!(summary.missing_entities, vec![table("users")]);
        assert!(summary.mismatched_entities.is_empty());
        assert!(!summary.all_entities_processed);
    }

    #[test]
    fn test_interrupted_exit_code() {
        let mut aggregator = ReportAggregator::new("2025-01-15");
        aggregator.add_validation_result(&service("billing"), checked("users", 1, 1));
        let report = aggregator.finish(true);
        assert_eq!(report.exit_code, exit_code::INTERRUPTED);
        assert!(report.interrupted);
    }

    #[test]
    fn test_merge_rerun_replaces_only_target() {
        let billing = service("billing");

        let mut first = ReportAggregator::new("2025-01-15");
        first.add_validation_result(&billing, checked("orders", 50, 50));
        first.add_validation_result(&billing, checked("users", 99, 100));
        first.add_validation_result(&service("claims"), checked("claims", 7, 7));
        let previous = first.finish(false);
        let untouched = serde_json::to_string(&previous.services[0].entities[0]).unwrap();
        let claims = serde_json::to_string(&previous.services[1]).unwrap();

        let mut rerun = ReportAggregator::new("2025-01-15");
        rerun.add_load_result(&billing, loaded("users", 100));
        rerun.add_validation_result(&billing, checked("users", 100, 100));
        let current = rerun.finish(false);

        let merged = merge_rerun(previous, current, &billing, &table("users"));
        let billing_report = merged.service(&billing).unwrap();
        assert_eq!(billing_report.entities.len(), 2);
        assert_eq!(
            serde_json::to_string(&billing_report.entities[0]).unwrap(),
            untouched
        );
        assert_eq!(serde_json::to_string(&merged.services[1]).unwrap(), claims);
        assert_eq!(billing_report.status, Status::Success);
        assert_eq!(merged.exit_code, exit_code::SUCCESS);
        assert_eq!(billing_report.summary.total_source_rows, 150);
    }

    #[test]
    fn test_merge_rerun_adds_missing_service() {
        let mut first = ReportAggregator::new("2025-01-15");
        first.add_validation_result(&service("claims"), checked("claims", 7, 7));
        let previous = first.finish(false);

        let billing = service("billing");
        let mut rerun = ReportAggregator::new("2025-01-15");
        rerun.add_validation_result(&billing, checked("users", 3, 3));
        let merged = merge_rerun(previous, rerun.finish(false), &billing, &table("users"));

        assert_eq!(merged.services.len(), 2);
        assert_eq!(merged.services[0].service, billing);
    }

    #[test]
    fn test_service_rerun_keeps_other_services() {
        let billing = service("billing");

        let mut first = ReportAggregator::new("2025-01-15");
        first.add_validation_result(&billing, checked("users", 99, 100));
        first.add_validation_result(&service("claims"), checked("claims", 7, 7));
        let previous = first.finish(false);
        let claims = serde_json::to_string(&previous.services[1]).unwrap();

        let mut rerun = ReportAggregator::new("2025-01-15");
        rerun.add_load_result(&billing, loaded("users", 100));
        rerun.add_validation_result(&billing, checked("users", 100, 100));
        let merged = merge_service_rerun(previous, rerun.finish(false), &billing);

        assert_eq!(merged.services.len(), 2);
        assert_eq!(serde_json::to_string(&merged.services[1]).unwrap(), claims);
        assert_eq!(merged.services[0].status, Status::Success);
        assert!(merged.services[0].entities[0].load.is_some());
        assert_eq!(merged.exit_code, exit_code::SUCCESS);
    }
}
