use std::io::Write;

/// 初始化全局 logger
///
/// 默认级别为 info，可以用 `RUST_LOG` 覆盖。可以重复调用（例如每个测试各调用一次），
/// 只有第一次生效。
pub fn init_log() {
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => info_style.fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
                log::Level::Error => info_style.fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
                level => buf.default_level_style(level),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let line = record.line().unwrap_or(0);
            let file = record.file().unwrap_or("").rsplit(|c| c == '/' || c == '\\').next().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} {}",
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
