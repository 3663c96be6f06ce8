//! Crux 内核构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成配置代码（src/config.rs）
//! 3. 导出编译期环境变量

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");

    let config_content = fs::read_to_string("../Kernel.toml")
        .expect("无法读取 Kernel.toml");

    // 解析 TOML
    let config: toml::Value = toml::from_str(&config_content)
        .expect("配置文件解析失败");

    // 打印配置信息
    if let Some(general) = config.get("general") {
        if let Some(name) = general["name"].as_str() {
            println!("cargo:rustc-env=CARGO_KERNEL_NAME={}", name);
        }
        if let Some(version) = general["version"].as_str() {
            println!("cargo:rustc-env=CARGO_KERNEL_VERSION={}", version);
        }
    }

    // 设置调试选项
    if let Some(debug) = config.get("debug") {
        if let Some(log_level) = debug.get("log_level").and_then(|v| v.as_str()) {
            println!("cargo:rustc-env=CRUX_LOG_LEVEL={}", log_level);
        }
    }

    // 生成配置代码
    generate_config_code(&config);
}

fn generate_config_code(config: &toml::Value) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());

    // 获取基本信息
    let kernel_name = config.get("general")
        .and_then(|g| g["name"].as_str())
        .unwrap_or("Crux");

    let kernel_version = config.get("general")
        .and_then(|g| g["version"].as_str())
        .unwrap_or("0.1.0");

    // 调度类选择（编译期确定具体类型）
    let sched_class = config.get("scheduler")
        .and_then(|s| s.get("class"))
        .and_then(|v| v.as_str())
        .unwrap_or("mprr");

    let sched_class_type = match sched_class {
        "rr" => "crate::sched::RoundRobin",
        "mlfq" => "crate::sched::Mlfq",
        "mprr" => "crate::sched::MpRoundRobin",
        other => panic!("未知的调度类: {}", other),
    };

    // 生成配置代码
    let config_header = format!(
        r#"//! Crux 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{}";

// ============================================================
// SMP 配置
// ============================================================

/// 是否启用SMP多核支持
pub const ENABLE_SMP: bool = {};

/// 最大CPU数量
pub const MAX_CPUS: usize = {};

// ============================================================
// 调度器配置
// ============================================================

/// 默认调度类名称
pub const SCHED_CLASS_NAME: &str = "{}";

/// 默认调度类
pub type DefaultSchedClass = {};

/// 默认时间片（tick 数）
pub const MAX_TIME_SLICE: u32 = {};

/// MLFQ 优先级层数
pub const MLFQ_LEVELS: usize = {};

// ============================================================
// 负载均衡配置
// ============================================================

/// 触发迁移的最小迁移数
pub const BALANCE_THRESHOLD: usize = {};

/// 单次负载均衡的最大迁移数
pub const MAX_BALANCE_MOVE: usize = {};
"#,
        kernel_name,
        kernel_version,
        // SMP 配置
        config.get("smp")
            .and_then(|s| s.get("enable_smp"))
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        config.get("smp")
            .and_then(|s| s.get("max_cpus"))
            .and_then(|v| v.as_integer())
            .unwrap_or(4) as usize,
        // 调度器配置
        sched_class,
        sched_class_type,
        config.get("scheduler")
            .and_then(|s| s.get("max_time_slice"))
            .and_then(|v| v.as_integer())
            .unwrap_or(8) as u32,
        config.get("scheduler")
            .and_then(|s| s.get("mlfq_levels"))
            .and_then(|v| v.as_integer())
            .unwrap_or(4) as usize,
        // 负载均衡配置
        config.get("scheduler")
            .and_then(|s| s.get("balance_threshold"))
            .and_then(|v| v.as_integer())
            .unwrap_or(3) as usize,
        config.get("scheduler")
            .and_then(|s| s.get("max_balance_move"))
            .and_then(|v| v.as_integer())
            .unwrap_or(100) as usize,
    );

    let src_dir = manifest_dir.join("src");
    let config_file = src_dir.join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_header {
        fs::write(&config_file, &config_header)
            .expect("写入配置文件失败");
    }
}
