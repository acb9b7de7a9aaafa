use super::output::print_link_reports;
use anyhow::{Context, Result};
use futures::future::join_all;
use streamchat_core::config::{StreamChatConfig, VerificationMode};
use streamchat_core::verify::{LinkReport, VerificationCache};

/// Handle the check-url command
pub async fn handle_check_url_command(
    mut config: StreamChatConfig,
    urls: &[String],
    direct: bool,
    json: bool,
) -> Result<()> {
    if direct {
        config.verification.mode = VerificationMode::Direct;
    }
    let cache = VerificationCache::from_config(&config);

    let results = join_all(urls.iter().map(|url| cache.check(url))).await;
    let reports: Vec<LinkReport> = urls
        .iter()
        .cloned()
        .zip(results)
        .map(|(url, verification)| LinkReport { url, verification })
        .collect();

    if json {
        let body: Vec<serde_json::Value> = reports
            .iter()
            .map(|report| -> Result<serde_json::Value, serde_json::Error> {
                let mut value = serde_json::to_value(report.verification.as_ref())?;
                if let Some(object) = value.as_object_mut() {
                    object.insert("url".to_string(), report.url.clone().into());
                }
                Ok(value)
            })
            .collect::<Result<_, _>>()
            .context("Failed to serialize results")?;
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print_link_reports(&reports);
    }

    Ok(())
}
