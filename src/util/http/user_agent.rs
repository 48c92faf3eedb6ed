use rand::Rng;

const CHROME_VERSIONS: [&str; 12] = [
    "131.0.6778.108", "130.0.6723.117", "129.0.6668.89", "128.0.6613.138",
    "127.0.6533.119", "126.0.6478.182", "125.0.6422.176", "124.0.6367.243",
    "123.0.6312.122", "122.0.6261.129", "121.0.6167.184", "120.0.6099.217",
];

const FIREFOX_VERSIONS: [&str; 8] = [
    "133.0", "132.0", "131.0", "130.0", "129.0", "128.0", "127.0", "126.0",
];

const EDGE_VERSIONS: [&str; 6] = [
    "131.0.2903.112", "130.0.2849.80", "129.0.2792.65", "128.0.2739.90", "127.0.2651.105",
    "126.0.2592.102",
];

const SAFARI_VERSIONS: [&str; 5] = ["18.2", "18.1", "18.0", "17.6", "17.5"];

const DESKTOP_OS: [&str; 6] = [
    "Windows NT 10.0; Win64; x64",
    "Windows NT 11.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "Macintosh; Intel Mac OS X 13_6",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
];

fn pick<'a>(items: &[&'a str]) -> &'a str {
    items[rand::rng().random_range(0..items.len())]
}

fn gen_chrome_ua() -> String {
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        pick(&DESKTOP_OS),
        pick(&CHROME_VERSIONS)
    )
}

fn gen_firefox_ua() -> String {
    let version = pick(&FIREFOX_VERSIONS);
    let os = pick(&DESKTOP_OS).replace("Intel Mac OS X 10_15_7", "Intel Mac OS X 10.15");
    format!(
        "Mozilla/5.0 ({}; rv:{}) Gecko/20100101 Firefox/{}",
        os, version, version
    )
}

fn gen_edge_ua() -> String {
    // Edge 只取 Windows 平台
    let os = pick(&DESKTOP_OS[..2]);
    let version = pick(&EDGE_VERSIONS);
    let chrome = version.split('.').next().unwrap_or("131");
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36 Edg/{}",
        os, chrome, version
    )
}

fn gen_safari_ua() -> String {
    let os = pick(&DESKTOP_OS[2..4]);
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{} Safari/605.1.15",
        os,
        pick(&SAFARI_VERSIONS)
    )
}

/// 隨機產生一組瀏覽器的 User-Agent，每個請求各自一組以降低被封鎖的機率
pub fn gen_random_ua() -> String {
    match rand::rng().random_range(0..20) {
        0..=9 => gen_chrome_ua(),    // 50% Chrome
        10..=13 => gen_firefox_ua(), // 20% Firefox
        14..=16 => gen_edge_ua(),    // 15% Edge
        _ => gen_safari_ua(),        // 15% Safari
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ua_formats() {
        for _ in 0..100 {
            let ua = gen_random_ua();
            assert!(ua.starts_with("Mozilla/5.0"), "UA should start with Mozilla/5.0: {}", ua);
            assert!(ua.len() > 50, "UA should be reasonably long: {}", ua);
        }
    }

    #[test]
    fn test_edge_is_windows_only() {
        for _ in 0..20 {
            let ua = gen_edge_ua();
            assert!(ua.contains("Windows"), "{}", ua);
            assert!(ua.contains("Edg/"), "{}", ua);
        }
    }
}
