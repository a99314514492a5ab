use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use printfleet_core::{ClientId, DepartmentId, LocationId, PrinterModelId, UnitId, UnitStatus};
use printfleet_fleet::{
    Assignment, AssignmentRecord, Client, Department, Location, NewPrinterModel, NewUnit,
    PrinterModel, UsageType,
};
use printfleet_infra::{JoinedRow, Normalized, ViewName, ViewSnapshot};

/// A fleet of `units` rows spread over 20 models and 10 clients, every
/// third unit in the pool.
fn snapshot(units: usize) -> ViewSnapshot {
    let now = Utc::now();
    let models: Vec<PrinterModel> = (0..20)
        .map(|i| {
            PrinterModel::create(
                PrinterModelId::new(),
                NewPrinterModel {
                    manufacturer: "Ricoh".to_string(),
                    series: None,
                    model: format!("IM {i}"),
                    name: None,
                    color: i % 2 == 0,
                    rental_eligible: true,
                },
                now,
            )
            .unwrap()
        })
        .collect();
    let clients: Vec<(Client, Department, Location)> = (0..10)
        .map(|i| {
            let client = Client::new(ClientId::new(), format!("Client {i}"), now).unwrap();
            let department =
                Department::new(DepartmentId::new(), client.id, "Operations", now).unwrap();
            let location = Location::new(LocationId::new(), department.id, "Main", now).unwrap();
            (client, department, location)
        })
        .collect();

    let rows = (0..units)
        .map(|i| {
            let model = &models[i % models.len()];
            let unit = Assignment::register(
                UnitId::new(),
                NewUnit {
                    printer_model_id: model.id,
                    serial_number: format!("SN-{i:06}"),
                    usage_type: UsageType::ServiceUnit,
                    monthly_price: None,
                    notes: None,
                },
                now,
            )
            .unwrap();
            let mut record = AssignmentRecord::from(&unit);

            if i % 3 == 0 {
                return JoinedRow {
                    assignment: record,
                    model: Some(model.clone()),
                    client: None,
                    location: None,
                    department: None,
                };
            }
            let (client, department, location) = &clients[i % clients.len()];
            record.status = UnitStatus::Active;
            record.client_id = Some(client.id);
            record.department_location_id = Some(location.id);
            JoinedRow {
                assignment: record,
                model: Some(model.clone()),
                client: Some(client.clone()),
                location: Some(location.clone()),
                department: Some(department.clone()),
            }
        })
        .collect();

    ViewSnapshot {
        rows,
        catalog: models,
    }
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for units in [100usize, 1_000, 10_000] {
        let snap = snapshot(units);
        group.throughput(Throughput::Elements(units as u64));
        group.bench_with_input(BenchmarkId::from_parameter(units), &snap, |b, snap| {
            b.iter(|| Normalized::from_snapshot(black_box(snap.clone())));
        });
    }
    group.finish();
}

fn bench_denormalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("denormalize");
    let normalized = Normalized::from_snapshot(snapshot(5_000));
    group.throughput(Throughput::Elements(5_000));
    for view in ViewName::ALL {
        group.bench_function(view.as_str(), |b| {
            b.iter(|| normalized.denormalize(black_box(view), None));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_denormalize);
criterion_main!(benches);
