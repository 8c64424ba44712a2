//! `ApiClient` — the BIB/SBC HTTP surface BinB Reader serves its e-books
//! behind.
//!
//! A book is addressed by a `bib` base URL and a content id (`cid`). Most
//! methods require a prior [`ApiClient::get_content_info`] call, which
//! populates the session's `p` token, server type, and decrypted key table.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::binb::cipher;
use crate::binb::keytable::{self, KeyTable};
use crate::{BinbError, BinbResult};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; MSIE 9.0; Windows NT 6.1; Trident/5.0)";

/// Image quality/size variants tried in order against the static CDN,
/// highest quality first.
const IMAGE_SIZE_PRIORITIES: [&str; 4] = ["M_H", "S_H", "M_L", "S_L"];

fn re_image_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"t-img src="(.+?)""#).unwrap())
}

fn re_data_uri() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:data:)?(?P<mime>[\w/\-.]+);(?P<encoding>\w+),(?P<data>.*)$").unwrap())
}

fn re_content_js() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w+?\((?P<data>.+)\)$").unwrap())
}

/// Which path the content server wants page fetches routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    /// Proxy everything through the SBC API (`p` required).
    Sbc,
    /// Fetch directly from the static CDN.
    Static,
}

impl ServerType {
    fn from_code(code: i64) -> Self {
        if code == 1 {
            ServerType::Static
        } else {
            ServerType::Sbc
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: i64,
    #[serde(default)]
    items: Vec<Value>,
    #[serde(flatten)]
    rest: Value,
}

fn check_result(method: &str, env: &Envelope) -> BinbResult<()> {
    if env.result != 1 {
        return Err(BinbError::Api {
            method: method.to_string(),
            result: env.result,
        });
    }
    Ok(())
}

/// Strip any directory prefix off a page path, keeping only the filename.
fn bare_filename(path: &str) -> String {
    match path.find('/') {
        Some(idx) => path[idx + 1..].to_string(),
        None => path.to_string(),
    }
}

/// A BIB/SBC HTTP client bound to one book.
pub struct ApiClient {
    http: reqwest::blocking::Client,
    bib: String,
    cid: String,
    k: String,
    p: Option<String>,
    sbc: Option<String>,
    server_type: Option<ServerType>,
    key_table: Option<KeyTable>,
    page_paths: Vec<String>,
    pages: Vec<String>,
    nec_page_paths: Vec<String>,
    extra_params: Vec<(String, String)>,
    /// Allow SBC-exclusive methods while `server_type` is `Static`, provided
    /// `p` is available. Mirrors BookLive's ability to proxy static content.
    pub allow_sbc_on_static: bool,
}

impl ApiClient {
    /// Build a client for `cid` against the `bib` base URL.
    ///
    /// `extra_params` are appended to every outgoing request (some BinB
    /// deployments require a vendor-specific token alongside `cid`/`k`/`p`).
    pub fn new(bib_url: &str, cid: &str, extra_params: Vec<(String, String)>) -> BinbResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(BinbError::from)?;

        let bib = if bib_url.ends_with('/') {
            bib_url.to_string()
        } else {
            format!("{bib_url}/")
        };

        Ok(Self {
            http,
            bib,
            cid: cid.to_string(),
            k: super::nonce::generate_k(),
            p: None,
            sbc: None,
            server_type: None,
            key_table: None,
            page_paths: Vec::new(),
            pages: Vec::new(),
            nec_page_paths: Vec::new(),
            extra_params,
            allow_sbc_on_static: false,
        })
    }

    pub fn cid(&self) -> &str {
        &self.cid
    }

    pub fn k(&self) -> &str {
        &self.k
    }

    pub fn server_type(&self) -> Option<ServerType> {
        self.server_type
    }

    pub fn key_table(&self) -> Option<&KeyTable> {
        self.key_table.as_ref()
    }

    pub fn page_paths(&self) -> &[String] {
        &self.page_paths
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    fn params(&self, extra: &[(&str, String)]) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = extra.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        out.extend(self.extra_params.iter().cloned());
        out
    }

    fn assert_sbc_server_type(&self) -> BinbResult<()> {
        match self.server_type {
            Some(ServerType::Sbc) => Ok(()),
            _ => {
                if !self.allow_sbc_on_static {
                    Err(BinbError::Config(
                        "attempted an SBC-exclusive method while server type is Static".into(),
                    ))
                } else if self.p.is_none() {
                    Err(BinbError::Config(
                        "allow_sbc_on_static is set, but no 'p' token is available".into(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn p(&self) -> BinbResult<&str> {
        self.p
            .as_deref()
            .ok_or_else(|| BinbError::Config("'p' was requested before get_content_info".into()))
    }

    fn sbc(&self) -> BinbResult<&str> {
        self.sbc
            .as_deref()
            .ok_or_else(|| BinbError::Config("'sbc' was requested before get_content_info".into()))
    }

    /// Fetch content info: decrypts the key table, determines the server
    /// type, and records `p`/`sbc` for subsequent calls.
    pub fn get_content_info(&mut self) -> BinbResult<Value> {
        let url = format!("{}bibGetCntntInfo.php", self.bib);
        let params = self.params(&[("cid", self.cid.clone()), ("k", self.k.clone())]);
        log::debug!("calling get_content_info: {url}");

        let resp = self.http.get(&url).query(&params).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BinbError::Http(format!("get_content_info: HTTP {status}")));
        }
        let env: Envelope = resp.json()?;
        check_result("get_content_info", &env)?;

        let info = env
            .items
            .into_iter()
            .next()
            .ok_or_else(|| BinbError::Api { method: "get_content_info".into(), result: 1 })?;

        let ctbl_raw = info["ctbl"]
            .as_str()
            .ok_or_else(|| BinbError::KeyDecode("missing 'ctbl' in content info".into()))?;
        let ptbl_raw = info["ptbl"]
            .as_str()
            .ok_or_else(|| BinbError::KeyDecode("missing 'ptbl' in content info".into()))?;
        let ctbl = cipher::decrypt_key_table(ctbl_raw, &self.cid, &self.k)?;
        let ptbl = cipher::decrypt_key_table(ptbl_raw, &self.cid, &self.k)?;
        self.key_table = Some(keytable::parse_key_table(&ctbl, &ptbl)?);

        let server_code = info["ServerType"]
            .as_i64()
            .ok_or_else(|| BinbError::Config("missing 'ServerType' in content info".into()))?;
        let server_type = ServerType::from_code(server_code);
        self.server_type = Some(server_type);
        // A Static server can still report a usable `p` token; capture it
        // unconditionally so `allow_sbc_on_static` has something to work with.
        if let Some(p) = info["p"].as_str() {
            self.p = Some(p.to_string());
        }
        let sbc = info["ContentsServer"]
            .as_str()
            .ok_or_else(|| BinbError::Config("missing 'ContentsServer' in content info".into()))?;
        self.sbc = Some(if sbc.ends_with('/') { sbc.to_string() } else { format!("{sbc}/") });

        Ok(info)
    }

    /// Fetch bibliographic metadata about the book.
    pub fn get_bibliography(&self) -> BinbResult<Value> {
        let url = format!("{}bibGetBibliography.php", self.bib);
        let params = self.params(&[("cid", self.cid.clone()), ("k", self.k.clone())]);
        let resp = self.http.get(&url).query(&params).send()?;
        if !resp.status().is_success() {
            return Err(BinbError::Http(format!("get_bibliography: HTTP {}", resp.status())));
        }
        let env: Envelope = resp.json()?;
        check_result("get_bibliography", &env)?;
        env.items
            .into_iter()
            .next()
            .ok_or_else(|| BinbError::Api { method: "get_bibliography".into(), result: 1 })
    }

    /// Check whether the session is recognized as logged in.
    pub fn check_login(&self) -> BinbResult<bool> {
        let url = format!("{}sbcChkLogin.php", self.sbc()?);
        let params = self.params(&[("cid", self.cid.clone()), ("p", self.p()?.to_string())]);
        let resp = self.http.get(&url).query(&params).send()?;
        if !resp.status().is_success() {
            return Err(BinbError::Http(format!("check_login: HTTP {}", resp.status())));
        }
        let env: Envelope = resp.json()?;
        Ok(env.result == 1)
    }

    /// Check whether the held `p` token is still valid.
    pub fn check_p(&self) -> BinbResult<bool> {
        let url = format!("{}sbcPCheck.php", self.sbc()?);
        let params = self.params(&[("cid", self.cid.clone()), ("p", self.p()?.to_string())]);
        let resp = self.http.get(&url).query(&params).send()?;
        if !resp.status().is_success() {
            return Err(BinbError::Http(format!("check_p: HTTP {}", resp.status())));
        }
        let env: Envelope = resp.json()?;
        Ok(env.result == 1)
    }

    /// Fetch the page list, populating `page_paths`/`pages`.
    pub fn get_content(&mut self) -> BinbResult<()> {
        let server_type = self
            .server_type
            .ok_or_else(|| BinbError::Config("get_content called before get_content_info".into()))?;

        let ttx = if server_type == ServerType::Static && !self.allow_sbc_on_static {
            let url = format!("{}content.js", self.sbc()?);
            let resp = self.http.get(&url).send()?;
            if !resp.status().is_success() {
                return Err(BinbError::Http(format!("get_content: HTTP {}", resp.status())));
            }
            let text = resp.text()?;
            let data = re_content_js()
                .captures(text.trim())
                .and_then(|c| c.name("data"))
                .ok_or_else(|| BinbError::Config("content.js did not match the expected JSONP wrapper".into()))?
                .as_str()
                .to_string();
            let content: Value = serde_json::from_str(&data)
                .map_err(|e| BinbError::Config(format!("content.js payload was not valid JSON: {e}")))?;
            content["ttx"]
                .as_str()
                .ok_or_else(|| BinbError::Config("content.js payload missing 'ttx'".into()))?
                .to_string()
        } else {
            self.assert_sbc_server_type()?;
            let url = format!("{}sbcGetCntnt.php", self.sbc()?);
            let params = self.params(&[("cid", self.cid.clone()), ("p", self.p()?.to_string())]);
            let resp = self.http.get(&url).query(&params).send()?;
            if !resp.status().is_success() {
                return Err(BinbError::Http(format!("get_content: HTTP {}", resp.status())));
            }
            let env: Envelope = resp.json()?;
            check_result("get_content", &env)?;
            env.rest["ttx"]
                .as_str()
                .ok_or_else(|| BinbError::Config("get_content response missing 'ttx'".into()))?
                .to_string()
        };

        self.set_page_paths_from_ttx(&ttx);
        Ok(())
    }

    fn set_page_paths_from_ttx(&mut self, ttx: &str) {
        let all: Vec<String> = re_image_path()
            .captures_iter(ttx)
            .map(|c| c[1].to_string())
            .collect();
        // The markup repeats the same listing twice; only the first half is real.
        let half = all.len() / 2;
        self.page_paths = all.into_iter().take(half).collect();
        self.pages = self.page_paths.iter().map(|s| bare_filename(s)).collect();
    }

    /// Fetch one page's raw scrambled bytes.
    ///
    /// On a static server, tries [`IMAGE_SIZE_PRIORITIES`] in order against
    /// the CDN; on an SBC server, proxies through `sbcGetImg.php`.
    pub fn get_image(&self, page_number: usize) -> BinbResult<Vec<u8>> {
        let path = self
            .page_paths
            .get(page_number)
            .ok_or_else(|| BinbError::Config(format!("page {page_number} out of range")))?;

        if self.server_type == Some(ServerType::Static) && !self.allow_sbc_on_static {
            let sbc = self.sbc()?;
            for size in IMAGE_SIZE_PRIORITIES {
                let url = format!("{sbc}{path}/{size}.jpg");
                let resp = self.http.get(&url).send()?;
                if resp.status().is_success() {
                    return Ok(resp.bytes()?.to_vec());
                }
            }
            Err(BinbError::Http(format!("get_image: no size variant available for {path}")))
        } else {
            self.assert_sbc_server_type()?;
            let url = format!("{}sbcGetImg.php", self.sbc()?);
            let params = self.params(&[
                ("cid", self.cid.clone()),
                ("p", self.p()?.to_string()),
                ("src", path.clone()),
                ("h", "9999".to_string()),
                ("q", "0".to_string()),
            ]);
            let resp = self.http.get(&url).query(&params).send()?;
            if !resp.status().is_success() {
                return Err(BinbError::Http(format!("get_image: HTTP {}", resp.status())));
            }
            Ok(resp.bytes()?.to_vec())
        }
    }

    fn fetch_data_uri_envelope(&self, url: &str, params: &[(String, String)], method: &str) -> BinbResult<Vec<u8>> {
        let resp = self.http.get(url).query(params).send()?;
        if !resp.status().is_success() {
            return Err(BinbError::Http(format!("{method}: HTTP {}", resp.status())));
        }
        let env: Envelope = resp.json()?;
        check_result(method, &env)?;
        let data_field = if env.items.is_empty() {
            env.rest["Data"].clone()
        } else {
            env.items[0]["Data"].clone()
        };
        let data_uri = data_field
            .as_str()
            .ok_or_else(|| BinbError::Config(format!("{method} response missing 'Data'")))?;
        decode_data_uri(data_uri)
    }

    /// Fetch one page as a base64 data URI and decode it to bytes.
    pub fn get_image_base64(&self, page_number: usize) -> BinbResult<Vec<u8>> {
        self.assert_sbc_server_type()?;
        let path = self
            .page_paths
            .get(page_number)
            .ok_or_else(|| BinbError::Config(format!("page {page_number} out of range")))?;
        let url = format!("{}sbcGetImgB64.php", self.sbc()?);
        let params = self.params(&[
            ("cid", self.cid.clone()),
            ("p", self.p()?.to_string()),
            ("src", path.clone()),
            ("h", "9999".to_string()),
            ("q", "0".to_string()),
        ]);
        self.fetch_data_uri_envelope(&url, &params, "get_image_base64")
    }

    /// Fetch a "nec" page by index, or by an explicit `src` path.
    pub fn get_nec_image(&self, page_number_or_src: NecImageRef<'_>) -> BinbResult<Vec<u8>> {
        self.assert_sbc_server_type()?;
        let src = match page_number_or_src {
            NecImageRef::PageNumber(n) => self
                .nec_page_paths
                .get(n)
                .cloned()
                .ok_or_else(|| BinbError::Config(format!("nec page {n} out of range")))?,
            NecImageRef::Src(s) => s.to_string(),
        };
        let url = format!("{}sbcGetNecImg.php", self.sbc()?);
        let params = self.params(&[
            ("cid", self.cid.clone()),
            ("p", self.p()?.to_string()),
            ("src", src),
            ("h", "9999".to_string()),
            ("q", "0".to_string()),
        ]);
        self.fetch_data_uri_envelope(&url, &params, "get_nec_image")
    }

    /// Fetch the list of "nec" page paths.
    pub fn get_nec_image_list(&mut self) -> BinbResult<&[String]> {
        self.assert_sbc_server_type()?;
        let url = format!("{}sbcGetNecImgList.php", self.sbc()?);
        let params = self.params(&[
            ("cid", self.cid.clone()),
            ("p", self.p()?.to_string()),
            ("h", "9999".to_string()),
            ("q", "0".to_string()),
        ]);
        let resp = self.http.get(&url).query(&params).send()?;
        if !resp.status().is_success() {
            return Err(BinbError::Http(format!("get_nec_image_list: HTTP {}", resp.status())));
        }
        let env: Envelope = resp.json()?;
        check_result("get_nec_image_list", &env)?;
        let names = env.rest["ImageName"]
            .as_array()
            .ok_or_else(|| BinbError::Config("get_nec_image_list response missing 'ImageName'".into()))?;
        self.nec_page_paths = names
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        Ok(&self.nec_page_paths)
    }

    /// Fetch one page, decoded, via whichever path is smaller-footprint for
    /// the current server type.
    pub fn get_small_image(&self, page_number: usize) -> BinbResult<Vec<u8>> {
        if self.server_type == Some(ServerType::Static) && !self.allow_sbc_on_static {
            return self.get_image(page_number);
        }
        self.assert_sbc_server_type()?;
        let path = self
            .page_paths
            .get(page_number)
            .ok_or_else(|| BinbError::Config(format!("page {page_number} out of range")))?;
        let url = format!("{}sbcGetSmlImg.php", self.sbc()?);
        let params = self.params(&[
            ("cid", self.cid.clone()),
            ("p", self.p()?.to_string()),
            ("src", path.clone()),
            ("h", "9999".to_string()),
            ("q", "0".to_string()),
        ]);
        self.fetch_data_uri_envelope(&url, &params, "get_small_image")
    }

    /// Fetch the page list via the small-image listing endpoint, which is
    /// more reliable than [`ApiClient::get_content`] when only the page
    /// paths are needed.
    pub fn get_small_image_list(&mut self) -> BinbResult<&[String]> {
        let server_type = self
            .server_type
            .ok_or_else(|| BinbError::Config("get_small_image_list called before get_content_info".into()))?;

        if server_type == ServerType::Static && !self.allow_sbc_on_static {
            self.get_content()?;
        } else {
            self.assert_sbc_server_type()?;
            let url = format!("{}sbcGetSmlImgList.php", self.sbc()?);
            let params = self.params(&[
                ("cid", self.cid.clone()),
                ("p", self.p()?.to_string()),
                ("h", "9999".to_string()),
                ("q", "0".to_string()),
            ]);
            let resp = self.http.get(&url).query(&params).send()?;
            if !resp.status().is_success() {
                return Err(BinbError::Http(format!("get_small_image_list: HTTP {}", resp.status())));
            }
            let env: Envelope = resp.json()?;
            check_result("get_small_image_list", &env)?;
            let names = env.rest["ImageName"]
                .as_array()
                .ok_or_else(|| BinbError::Config("get_small_image_list response missing 'ImageName'".into()))?;
            self.page_paths = names
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            self.pages = self.page_paths.iter().map(|s| bare_filename(s)).collect();
        }
        Ok(&self.page_paths)
    }
}

/// Selects which "nec" image to fetch with [`ApiClient::get_nec_image`].
pub enum NecImageRef<'a> {
    PageNumber(usize),
    Src(&'a str),
}

fn decode_data_uri(data_uri: &str) -> BinbResult<Vec<u8>> {
    use base64::Engine;
    let caps = re_data_uri()
        .captures(data_uri)
        .ok_or_else(|| BinbError::Config(format!("unexpected data URI shape: {data_uri:?}")))?;
    base64::engine::general_purpose::STANDARD
        .decode(&caps["data"])
        .map_err(|e| BinbError::Config(format!("data URI was not valid base64: {e}")))
}
