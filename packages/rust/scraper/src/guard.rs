//! Target URL checks applied before a URL is handed to the scraping service.

use std::net::IpAddr;

use url::Url;

/// Parse and vet a search-result link.
///
/// Returns the URL with its fragment stripped, or the reason it was refused.
pub(crate) fn vet_target(raw: &str) -> std::result::Result<Url, String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| format!("invalid URL: {e}"))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{other}'")),
    }

    if is_private_target(&url) {
        return Err("refusing private or local address".into());
    }

    url.set_fragment(None);
    Ok(url)
}

fn is_private_target(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return true;
    };

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return is_private_ip(&ip);
    }

    host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10
                || (octets[0] == 100 && (octets[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
