// ==========================================
// 药盒分装排产系统 - 命令行入口
// ==========================================
// 用法: pack-fill-scheduler <request.json> [settings.json]
// 输入: SchedulingRequest JSON；设置文件为 StaticSettings JSON (可选)
// 输出: ScheduleOutcome JSON 写到 stdout，日志写到 stderr
// 日志: PACK_FILL_LOG_FORMAT=json 时输出 JSON 格式
// ==========================================

use anyhow::{bail, Context, Result};
use pack_fill_scheduler::config::StaticSettings;
use pack_fill_scheduler::domain::SchedulingRequest;
use pack_fill_scheduler::engine::ScheduleOrchestrator;
use pack_fill_scheduler::logging;
use std::fs;
use std::sync::Arc;

fn main() -> Result<()> {
    match std::env::var("PACK_FILL_LOG_FORMAT").as_deref() {
        Ok("json") => logging::init_json(),
        _ => logging::init(),
    }

    tracing::info!("==================================================");
    tracing::info!("{} v{}", pack_fill_scheduler::APP_NAME, pack_fill_scheduler::VERSION);
    tracing::info!("==================================================");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(request_path) = args.first() else {
        bail!("用法: pack-fill-scheduler <request.json> [settings.json]");
    };

    let raw = fs::read_to_string(request_path)
        .with_context(|| format!("无法读取排产请求: {}", request_path))?;
    let request: SchedulingRequest =
        serde_json::from_str(&raw).with_context(|| format!("排产请求格式错误: {}", request_path))?;

    let settings = match args.get(1) {
        Some(path) => {
            let raw = fs::read_to_string(path).with_context(|| format!("无法读取设置文件: {}", path))?;
            serde_json::from_str::<StaticSettings>(&raw)
                .with_context(|| format!("设置文件格式错误: {}", path))?
        }
        None => StaticSettings::new(),
    };

    let orchestrator = ScheduleOrchestrator::new(Arc::new(settings));
    let outcome = orchestrator.run(&request).context("排产失败")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
