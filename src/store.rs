//! Access to the remote archive of raw radar volumes.
//!
//! The only operations used are listing by prefix and fetching by exact key.

use std::{fs::File, io::Write, path::Path};

use chrono::NaiveDateTime;
use quick_xml::events::Event;
use reqwest::{blocking::Client, StatusCode};

use crate::{errors::WsrDataErr, scan_key::ScanKey};

/// The public NEXRAD level II bucket.
pub const DEFAULT_BUCKET_URL: &str = "https://noaa-nexrad-level2.s3.amazonaws.com";

/// One entry in a listing of the remote store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteObject {
    /// The full key, e.g. `2015/05/02/KMPX/KMPX20150502_021525_V06.gz`.
    pub key: String,
    /// The station, as parsed from the key.
    pub station: String,
    /// The scan time, as parsed from the key.
    pub time: NaiveDateTime,
}

impl RemoteObject {
    /// Build an object from a listed key. Fails if the file name is not a scan name.
    pub fn from_key(key: &str) -> Result<Self, WsrDataErr> {
        let scan_key = ScanKey::parse(key)?;

        Ok(RemoteObject {
            key: key.to_owned(),
            station: scan_key.station().to_owned(),
            time: scan_key.time(),
        })
    }
}

/// A read-only object store.
pub trait ObjectStore {
    /// List every key that starts with `prefix`, in lexicographic order.
    fn list(&self, prefix: &str) -> Result<Vec<String>, WsrDataErr>;

    /// Write the object at `key` to `dest`.
    ///
    /// Must return `WsrDataErr::NotFound` when the store has no such key, and
    /// `WsrDataErr::TransientFetch` (or any other variant) for every other failure.
    fn fetch(&self, key: &str, dest: &Path) -> Result<(), WsrDataErr>;
}

/// An S3 bucket read through its public REST interface.
#[derive(Debug)]
pub struct S3Bucket {
    base_url: String,
    client: Client,
}

impl S3Bucket {
    /// Connect to a bucket by its base url, e.g. [`DEFAULT_BUCKET_URL`].
    pub fn new(base_url: &str) -> Self {
        S3Bucket {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: Client::new(),
        }
    }

    fn list_page(
        &self,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, WsrDataErr> {
        let mut query = vec![("list-type", "2"), ("prefix", prefix)];
        if let Some(token) = token {
            query.push(("continuation-token", token));
        }

        let response = self
            .client
            .get(&format!("{}/", self.base_url))
            .query(&query)
            .send()
            .map_err(|err| WsrDataErr::TransientFetch(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WsrDataErr::TransientFetch(format!(
                "listing {} returned {}",
                prefix, status
            )));
        }

        let body = response.text()?;
        parse_list_page(&body)
    }
}

impl ObjectStore for S3Bucket {
    fn list(&self, prefix: &str) -> Result<Vec<String>, WsrDataErr> {
        let mut keys = vec![];
        let mut token: Option<String> = None;

        loop {
            let page = self.list_page(prefix, token.as_deref())?;
            keys.extend(page.keys);

            match page.next_token {
                Some(next) if page.truncated => token = Some(next),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn fetch(&self, key: &str, dest: &Path) -> Result<(), WsrDataErr> {
        let url = format!("{}/{}", self.base_url, key);

        let mut response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| WsrDataErr::TransientFetch(err.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(WsrDataErr::NotFound(key.to_owned())),
            code => {
                return Err(WsrDataErr::TransientFetch(format!(
                    "HTTP error ({}): {}",
                    code, url
                )))
            }
        }

        // Only a complete download may exist at `dest`.
        let part = dest.with_extension("part");
        let result = File::create(&part)
            .map_err(WsrDataErr::from)
            .and_then(|mut file| {
                response
                    .copy_to(&mut file)
                    .map_err(|err| WsrDataErr::TransientFetch(err.to_string()))?;
                file.flush()?;
                Ok(())
            })
            .and_then(|_| std::fs::rename(&part, dest).map_err(WsrDataErr::from));

        if result.is_err() {
            let _ = std::fs::remove_file(&part);
        }

        result
    }
}

#[derive(Debug, Default, PartialEq)]
struct ListPage {
    keys: Vec<String>,
    truncated: bool,
    next_token: Option<String>,
}

fn parse_list_page(body: &str) -> Result<ListPage, WsrDataErr> {
    let mut reader = quick_xml::Reader::from_str(body);
    reader.trim_text(true);

    let mut page = ListPage::default();
    let mut element: Vec<u8> = vec![];

    loop {
        match reader.read_event()? {
            Event::Start(start) => element = start.name().as_ref().to_vec(),
            Event::Text(text) => {
                let text = text.unescape()?;
                match element.as_slice() {
                    b"Key" => page.keys.push(text.into_owned()),
                    b"IsTruncated" => page.truncated = text.as_ref() == "true",
                    b"NextContinuationToken" => page.next_token = Some(text.into_owned()),
                    _ => {}
                }
            }
            Event::End(_) => element.clear(),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(page)
}


/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    use chrono::NaiveDate;

    #[test]
    fn test_parse_list_page() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>noaa-nexrad-level2</Name>
  <Prefix>2015/05/02/KMPX/KMPX</Prefix>
  <KeyCount>2</KeyCount>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=</NextContinuationToken>
  <Contents>
    <Key>2015/05/02/KMPX/KMPX20150502_000527_V06.gz</Key>
    <Size>5823456</Size>
  </Contents>
  <Contents>
    <Key>2015/05/02/KMPX/KMPX20150502_001520_V06.gz</Key>
    <Size>5811234</Size>
  </Contents>
</ListBucketResult>"#;

        let page = parse_list_page(body).unwrap();
        assert_eq!(
            page.keys,
            vec![
                "2015/05/02/KMPX/KMPX20150502_000527_V06.gz",
                "2015/05/02/KMPX/KMPX20150502_001520_V06.gz"
            ]
        );
        assert!(page.truncated);
        assert_eq!(
            page.next_token.as_deref(),
            Some("1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=")
        );
    }

    #[test]
    fn test_remote_object_from_key() {
        let obj = RemoteObject::from_key("2015/05/02/KMPX/KMPX20150502_021525_V06.gz").unwrap();
        assert_eq!(obj.station, "KMPX");
        assert_eq!(obj.time, NaiveDate::from_ymd(2015, 5, 2).and_hms(2, 15, 25));

        assert!(RemoteObject::from_key("2015/05/02/KMPX/NWS_NEXRAD_README.txt").is_err());
    }
}
