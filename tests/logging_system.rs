//! 日志系统集成测试.
//!
//! 历史日志清理使用临时目录, 不依赖全局订阅器.
//! 由于 tracing 的全局订阅器只能初始化一次, 本文件只有一个测试调用 init().

use chrono::{Duration, Utc};
use std::fs;
use std::path::Path;
use tao_aac::logging::{LoggingConfig, cleanup_logs, init, log_file_path};
use tempfile::TempDir;

fn make_config(directory: &Path, prefix: &str, compress_history: bool) -> LoggingConfig {
    LoggingConfig {
        level: "debug".to_string(),
        directory: directory.to_string_lossy().to_string(),
        file_prefix: prefix.to_string(),
        retention_days: 7,
        compress_history,
    }
}

fn temp_dir() -> TempDir {
    match TempDir::new() {
        Ok(dir) => dir,
        Err(err) => panic!("创建临时目录失败: {}", err),
    }
}

#[test]
fn test_清理过期日志并压缩历史日志() {
    let dir = temp_dir();
    let today = Utc::now().date_naive();
    let expired = log_file_path(dir.path(), "enc", today - Duration::days(10));
    let yesterday = log_file_path(dir.path(), "enc", today - Duration::days(1));
    let current = log_file_path(dir.path(), "enc", today);
    let unrelated = dir.path().join("notes.txt");

    for path in [&expired, &yesterday, &current, &unrelated] {
        fs::write(path, "日志内容\n").unwrap();
    }

    cleanup_logs(&make_config(dir.path(), "enc", true)).unwrap();

    assert!(!expired.exists(), "过期日志应被删除");
    assert!(!yesterday.exists(), "历史日志应被压缩后删除原文件");
    let gz = dir.path().join(format!(
        "{}.gz",
        yesterday.file_name().unwrap().to_string_lossy()
    ));
    assert!(gz.exists(), "应生成压缩日志: {:?}", gz);
    assert!(current.exists(), "当天日志不应被处理");
    assert!(unrelated.exists(), "无关文件不应被处理");
}

#[test]
fn test_关闭压缩时保留历史日志() {
    let dir = temp_dir();
    let today = Utc::now().date_naive();
    let yesterday = log_file_path(dir.path(), "enc", today - Duration::days(1));
    fs::write(&yesterday, "日志内容\n").unwrap();

    cleanup_logs(&make_config(dir.path(), "enc", false)).unwrap();
    assert!(yesterday.exists());
}

#[test]
fn test_日志目录不存在时清理成功() {
    let dir = temp_dir();
    let missing = dir.path().join("missing");
    assert!(cleanup_logs(&make_config(&missing, "enc", true)).is_ok());
}

#[test]
fn test_初始化并写入编码日志() {
    let dir = temp_dir();
    let log_dir = dir.path().join("nested").join("logs");
    init(make_config(&log_dir, "tao-aac-test", false)).unwrap();
    assert!(log_dir.exists(), "嵌套日志目录应该被创建");

    // 编码器通过 log 门面输出, 经桥接写入文件
    let encoder = tao_aac::AacEncoder::open(44100, 2).unwrap();
    encoder.close();
    tracing::info!("测试信息日志_12345");

    assert!(
        init(make_config(&log_dir, "tao-aac-test", false)).is_err(),
        "重复初始化应返回错误"
    );

    std::thread::sleep(std::time::Duration::from_millis(300));

    let content: String = fs::read_dir(&log_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("tao-aac-test"))
        .filter_map(|entry| fs::read_to_string(entry.path()).ok())
        .collect();
    assert!(content.contains("测试信息日志_12345"), "日志内容:\n{}", content);
    assert!(content.contains("INFO"));
    assert!(content.contains("打开 AAC-LC 编码器"), "日志内容:\n{}", content);
}
