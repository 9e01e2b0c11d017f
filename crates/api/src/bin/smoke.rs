//! Smoke test client for a running prediction service
//!
//! Usage: `leafscan-smoke [image_path]`. Targets `API_URL`
//! (default `http://localhost:5000`) and exits non-zero if any check fails.

use anyhow::{bail, Context};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:5000";
const PREDICT_TIMEOUT: Duration = Duration::from_secs(30);

async fn get_json(client: &reqwest::Client, url: &str) -> anyhow::Result<Value> {
    let response = client.get(url).send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    println!("Status: {}", status.as_u16());
    println!("Response: {}", body);
    if !status.is_success() {
        bail!("{} returned {}", url, status);
    }
    Ok(body)
}

async fn check_predict(client: &reqwest::Client, base: &str, image_path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(image_path)
        .await
        .with_context(|| format!("image file not found: {}", image_path.display()))?;
    let filename = image_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();

    let form = Form::new().part("image", Part::bytes(bytes).file_name(filename));
    let response = client
        .post(format!("{}/predict", base))
        .multipart(form)
        .timeout(PREDICT_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    let body: Value = response.json().await?;
    println!("Status: {}", status.as_u16());
    if !status.is_success() {
        bail!("prediction failed: {}", body);
    }

    let prediction = &body["prediction"];
    println!("Prediction successful!");
    println!("   Class: {}", prediction["classVi"].as_str().unwrap_or("?"));
    println!(
        "   Confidence: {:.2}%",
        prediction["confidence"].as_f64().unwrap_or_default()
    );
    println!("   All predictions:");
    if let Some(all) = prediction["allPredictions"].as_object() {
        for (class, pct) in all {
            println!("      - {}: {:.2}%", class, pct.as_f64().unwrap_or_default());
        }
    }
    Ok(())
}

fn report(name: &str, outcome: &anyhow::Result<()>) -> bool {
    match outcome {
        Ok(()) => {
            println!("   {}: PASS", name);
            true
        }
        Err(e) => {
            println!("   {}: FAIL ({:#})", name, e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base = std::env::var("API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let base = base.trim_end_matches('/').to_string();
    let image = std::env::args().nth(1);
    let client = reqwest::Client::new();

    println!("{}", "=".repeat(60));
    println!("Rice Disease Detection API - Smoke Test");
    println!("{}", "=".repeat(60));
    println!("API URL: {}\n", base);

    println!("Testing health check...");
    let health = get_json(&client, &format!("{}/health", base)).await.map(|_| ());

    println!("\nTesting API info...");
    let info = get_json(&client, &format!("{}/", base)).await.map(|_| ());

    let predict = match &image {
        Some(path) => {
            println!("\nTesting prediction with image: {}", path);
            Some(check_predict(&client, &base, Path::new(path)).await)
        }
        None => {
            println!("\nNo image provided, skipping prediction test");
            println!("   Usage: leafscan-smoke <image_path>");
            None
        }
    };

    println!("\n{}", "=".repeat(60));
    println!("Results:");
    let mut passed = report("Health Check", &health);
    passed &= report("API Info", &info);
    if let Some(outcome) = &predict {
        passed &= report("Prediction", outcome);
    }
    println!("{}", "=".repeat(60));

    if !passed {
        bail!("smoke test failed");
    }
    Ok(())
}
