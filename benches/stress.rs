use std::sync::Arc;
use std::time::{Duration, Instant};

use parkade::engine::Engine;
use parkade::model::{FacilityLayout, SpotType, VehicleType};
use ulid::Ulid;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// Mixed level: a block of motorcycle spots, rows of cars, a few van bays.
fn level(name: &str) -> FacilityLayout {
    let mut spots = vec![SpotType::Motorcycle; 20];
    spots.extend(std::iter::repeat_n(SpotType::Car, 150));
    spots.extend(std::iter::repeat_n(SpotType::Van, 10));
    FacilityLayout {
        id: None,
        name: name.into(),
        capacity: None,
        motorcycle_spots: None,
        car_spots: None,
        van_spots: None,
        spots,
    }
}

async fn fresh_engine(tag: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("parkade_bench_{tag}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    Arc::new(Engine::new(dir.join("bench.wal")).expect("open engine"))
}

async fn phase1_sequential() {
    let engine = fresh_engine("seq").await;
    let fid = engine.create_facility(level("Seq")).await.unwrap().id;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n * 2);
    let start = Instant::now();
    for i in 0..n {
        let plate = format!("SEQ-{i}");
        let t = Instant::now();
        engine.park(fid, plate.clone(), VehicleType::Car).await.unwrap();
        latencies.push(t.elapsed());
        let t = Instant::now();
        engine.unpark(&plate).await.unwrap();
        latencies.push(t.elapsed());
    }
    let elapsed = start.elapsed();
    let ops = (n * 2) as f64 / elapsed.as_secs_f64();
    println!("  {} park/unpark ops in {:.2}s = {ops:.0} ops/sec", n * 2, elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent() {
    let engine = fresh_engine("conc").await;
    let mut facilities = Vec::new();
    for i in 0..10 {
        facilities.push(engine.create_facility(level(&format!("L{i}"))).await.unwrap().id);
    }

    let n_tasks = 40;
    let n_per_task = 200;
    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let engine = engine.clone();
        let fid = facilities[task % facilities.len()];
        handles.push(tokio::spawn(async move {
            let kinds = [VehicleType::Car, VehicleType::Motorcycle, VehicleType::Van];
            let mut latencies = Vec::with_capacity(n_per_task);
            let mut rejected = 0usize;
            for i in 0..n_per_task {
                let plate = format!("T{task}-{i}");
                let t = Instant::now();
                match engine.park(fid, plate.clone(), kinds[i % kinds.len()]).await {
                    Ok(_) => {
                        engine.unpark(&plate).await.unwrap();
                        latencies.push(t.elapsed());
                    }
                    Err(_) => rejected += 1,
                }
            }
            (latencies, rejected)
        }));
    }

    let mut all = Vec::new();
    let mut rejected = 0;
    for handle in handles {
        let (latencies, r) = handle.await.unwrap();
        all.extend(latencies);
        rejected += r;
    }
    let elapsed = start.elapsed();
    let cycles = all.len();
    println!(
        "  {cycles} park+unpark cycles from {n_tasks} tasks in {:.2}s = {:.0} cycles/sec ({rejected} rejected)",
        elapsed.as_secs_f64(),
        cycles as f64 / elapsed.as_secs_f64()
    );
    print_latency("cycle latency", &mut all);
}

async fn phase3_read_under_load() {
    let engine = fresh_engine("read").await;
    let fid = engine.create_facility(level("Read")).await.unwrap().id;

    let writer_engine = engine.clone();
    let writer = tokio::spawn(async move {
        for i in 0..3000 {
            let plate = format!("W-{i}");
            if writer_engine.park(fid, plate.clone(), VehicleType::Car).await.is_ok() {
                writer_engine.unpark(&plate).await.unwrap();
            }
        }
    });

    let mut latencies = Vec::new();
    while !writer.is_finished() {
        let t = Instant::now();
        engine.count_available(fid).await.unwrap();
        engine.is_full(fid).await.unwrap();
        latencies.push(t.elapsed());
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    print_latency("read latency", &mut latencies);
}

async fn phase4_fill_and_drain() {
    let engine = fresh_engine("fill").await;
    let mut spots = vec![SpotType::Car; 3000];
    spots.extend(std::iter::repeat_n(SpotType::Van, 30));
    let mut layout = level("Fill");
    layout.spots = spots;
    let fid = engine.create_facility(layout).await.unwrap().id;

    // Vans exhaust the van bays and then overflow into car rows until the
    // rows run out.
    let start = Instant::now();
    let mut parked = Vec::new();
    let mut latencies = Vec::new();
    for i in 0.. {
        let plate = format!("VAN-{i}");
        let t = Instant::now();
        match engine.park(fid, plate.clone(), VehicleType::Van).await {
            Ok(_) => {
                latencies.push(t.elapsed());
                parked.push(plate);
            }
            Err(_) => break,
        }
    }
    println!(
        "  parked {} vans ({} spots taken by vans) in {:.2}s",
        parked.len(),
        engine.count_van_spots(fid).await.unwrap(),
        start.elapsed().as_secs_f64()
    );
    print_latency("park latency while filling", &mut latencies);

    let t = Instant::now();
    engine.compact_wal().await.unwrap();
    println!("  compaction took {:.2}ms", t.elapsed().as_secs_f64() * 1000.0);

    for plate in &parked {
        engine.unpark(plate).await.unwrap();
    }
    assert_eq!(engine.count_occupied(fid).await.unwrap(), 0);
}

#[tokio::main]
async fn main() {
    println!("=== parkade stress benchmark ===\n");

    println!("[phase 1] sequential park/unpark");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent park/unpark across facilities");
    phase2_concurrent().await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load().await;

    println!("\n[phase 4] van fill, compaction, drain");
    phase4_fill_and_drain().await;

    println!("\n=== benchmark complete ===");
}
