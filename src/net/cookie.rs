use std::fmt::Write;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetCookie {
    name: String,
    value: String,
    expires: Option<DateTime<Utc>>,
    max_age: Option<std::time::Duration>,
    domain: Option<String>,
    path: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl SetCookie {
    pub fn new<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        SetCookie {
            name: name.into(),
            value: value.into(),
            expires: None,
            max_age: None,
            domain: None,
            path: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_max_age(mut self, max_age: std::time::Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_path<P>(mut self, path: P) -> Self
    where
        P: Into<String>
    {
        self.path = Some(path.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn set_domain<D>(&mut self, domain: D)
    where
        D: Into<String>
    {
        self.domain = Some(domain.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// renders the Set-Cookie header value
    pub fn header_value(&self) -> String {
        let mut rtn = format!("{}={}", self.name, self.value);

        if let Some(expires) = &self.expires {
            write!(
                &mut rtn,
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ).unwrap();
        }

        if let Some(max_age) = &self.max_age {
            write!(&mut rtn, "; Max-Age={}", max_age.as_secs()).unwrap();
        }

        if let Some(domain) = &self.domain {
            write!(&mut rtn, "; Domain={domain}").unwrap();
        }

        if let Some(path) = &self.path {
            write!(&mut rtn, "; Path={path}").unwrap();
        }

        if self.secure {
            rtn.push_str("; Secure");
        }

        if self.http_only {
            rtn.push_str("; HttpOnly");
        }

        if let Some(same_site) = &self.same_site {
            write!(&mut rtn, "; SameSite={}", same_site.as_str()).unwrap();
        }

        rtn
    }
}

impl std::fmt::Display for SetCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.header_value())
    }
}

/// scans raw Cookie header values for the named cookie
pub fn find_cookie<'a, I>(values: I, name: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>
{
    for value in values {
        for pair in value.split(';') {
            if let Some((key, found)) = pair.trim().split_once('=') {
                if key == name {
                    return Some(found);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_all_attributes() {
        let expires = Utc.with_ymd_and_hms(2026, 9, 7, 12, 30, 0).unwrap();

        let mut cookie = SetCookie::new("trusted_device", "abc123")
            .with_expires(expires)
            .with_path("/")
            .with_http_only(true)
            .with_secure(true)
            .with_same_site(SameSite::Strict);
        cookie.set_domain("portal.example.edu");

        assert_eq!(
            cookie.header_value(),
            "trusted_device=abc123; \
            Expires=Mon, 07 Sep 2026 12:30:00 GMT; \
            Domain=portal.example.edu; \
            Path=/; \
            Secure; \
            HttpOnly; \
            SameSite=Strict"
        );
    }

    #[test]
    fn renders_removal_cookie() {
        let cookie = SetCookie::new("trusted_device", "")
            .with_max_age(std::time::Duration::new(0, 0))
            .with_path("/")
            .with_http_only(true);

        assert_eq!(
            cookie.header_value(),
            "trusted_device=; Max-Age=0; Path=/; HttpOnly"
        );
    }

    #[test]
    fn finds_cookie_among_pairs() {
        let headers = ["session_id=outer; trusted_device=value64; theme=dark"];

        assert_eq!(
            find_cookie(headers, "trusted_device"),
            Some("value64")
        );
        assert_eq!(find_cookie(headers, "missing"), None);
    }
}
