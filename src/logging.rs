// ==========================================
// 药盒分装排产系统 - 日志初始化
// ==========================================
// 输出: stderr (stdout 留给排产结果 JSON)
// 级别: RUST_LOG 优先，未设置时取默认指令
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

// 默认: 本 crate info，依赖库仅 warn
const DEFAULT_DIRECTIVES: &str = "warn,pack_fill_scheduler=info";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// 初始化文本日志
///
/// # 环境变量
/// - RUST_LOG: 例如 `pack_fill_scheduler::engine::multi_batch=debug` 查看切批过程
///
/// # 示例
/// ```no_run
/// pack_fill_scheduler::logging::init();
/// ```
pub fn init() {
    fmt()
        .with_env_filter(env_filter(DEFAULT_DIRECTIVES))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .init();
}

/// 初始化 JSON 日志，每行一个事件，附带当前 span (run_id / zone_id 等字段)
pub fn init_json() {
    fmt()
        .json()
        .with_env_filter(env_filter(DEFAULT_DIRECTIVES))
        .with_writer(std::io::stderr)
        .with_current_span(true)
        .with_span_list(false)
        .init();
}

/// 测试用: 输出交给 libtest 捕获，重复调用无副作用
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(env_filter("pack_fill_scheduler=debug"))
        .with_test_writer()
        .try_init();
}
