//! Load generator for a running greenroom server. Not a criterion bench —
//! run the server, then `cargo bench --bench stress`.
//!
//! Environment: GREENROOM_BENCH_HOST (default 127.0.0.1),
//! GREENROOM_BENCH_PORT (default 5433).

use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Utc};
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

async fn connect(host: &str, port: u16, dbname: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(dbname)
        .user("greenroom")
        .password("greenroom");

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
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
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn bench_dates(n: u64) -> Vec<NaiveDate> {
    let tomorrow = Utc::now().date_naive() + Days::new(2);
    (0..n).map(|i| tomorrow + Days::new(i)).collect()
}

fn insert_sql(id: Ulid, date: NaiveDate, start: &str, duration: u8) -> String {
    format!(
        "INSERT INTO bookings (id, date, start_time, duration, band_name, email, phone, members_count, notes) \
         VALUES ('{id}', '{date}', '{start}', {duration}, 'Bench Band', 'bench@example.org', NULL, 4, NULL)"
    )
}

/// Sequential booking inserts, one slot per day-start pair.
async fn phase1_sequential_inserts(host: &str, port: u16) {
    let client = connect(host, port, &format!("bench_{}", Ulid::new())).await;
    let dates = bench_dates(200);
    let starts = ["09:00", "11:00", "13:00", "15:00", "17:00", "19:00", "21:00"];

    let mut latencies = Vec::with_capacity(dates.len() * starts.len());
    let begin = Instant::now();
    for date in &dates {
        for start in &starts {
            let t = Instant::now();
            client
                .batch_execute(&insert_sql(Ulid::new(), *date, start, 2))
                .await
                .unwrap();
            latencies.push(t.elapsed());
        }
    }
    let elapsed = begin.elapsed();
    println!(
        "  throughput: {:.0} inserts/s",
        latencies.len() as f64 / elapsed.as_secs_f64()
    );
    print_latency("sequential inserts", &mut latencies);
}

/// Concurrent availability reads while one writer keeps booking.
async fn phase2_reads_under_write_load(host: &str, port: u16) {
    let db = format!("bench_{}", Ulid::new());
    let writer = connect(host, port, &db).await;
    let dates = bench_dates(30);

    let writer_dates = dates.clone();
    let writer_task = tokio::spawn(async move {
        let starts = ["09:00", "10:30", "12:00", "13:30", "15:00", "16:30"];
        for date in &writer_dates {
            for start in &starts {
                let _ = writer
                    .batch_execute(&insert_sql(Ulid::new(), *date, start, 1))
                    .await;
            }
        }
    });

    let mut readers = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        let dates = dates.clone();
        let host = host.to_string();
        readers.push(tokio::spawn(async move {
            let client = connect(&host, port, &db).await;
            let mut latencies = Vec::new();
            for _ in 0..50 {
                for date in &dates {
                    let t = Instant::now();
                    client
                        .simple_query(&format!(
                            "SELECT * FROM availability WHERE date = '{date}' AND duration = 2"
                        ))
                        .await
                        .unwrap();
                    latencies.push(t.elapsed());
                }
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for r in readers {
        all.extend(r.await.unwrap());
    }
    writer_task.await.unwrap();
    print_latency("availability reads under write load", &mut all);
}

/// Full lifecycle: insert, approve, cancel.
async fn phase3_lifecycle(host: &str, port: u16) {
    let client = connect(host, port, &format!("bench_{}", Ulid::new())).await;
    let dates = bench_dates(100);

    let mut latencies = Vec::with_capacity(dates.len());
    for date in &dates {
        let id = Ulid::new();
        let t = Instant::now();
        client
            .batch_execute(&insert_sql(id, *date, "14:00", 2))
            .await
            .unwrap();
        client
            .batch_execute(&format!(
                "UPDATE bookings SET status = 'approved' WHERE id = '{id}'"
            ))
            .await
            .unwrap();
        client
            .batch_execute(&format!(
                "UPDATE bookings SET status = 'cancelled', cancel_reason = 'bench' WHERE id = '{id}'"
            ))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }
    print_latency("insert+approve+cancel", &mut latencies);
}

#[tokio::main]
async fn main() {
    let host = std::env::var("GREENROOM_BENCH_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("GREENROOM_BENCH_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5433);

    println!("greenroom stress bench against {host}:{port}");

    println!("phase 1: sequential inserts");
    phase1_sequential_inserts(&host, port).await;

    println!("phase 2: reads under write load");
    phase2_reads_under_write_load(&host, port).await;

    println!("phase 3: lifecycle");
    phase3_lifecycle(&host, port).await;
}
