use cid::Cid;
use ipld_core::ipld::Ipld;

use crate::Error;

pub fn decode(buf: &[u8]) -> Result<Ipld, Error> {
    serde_ipld_dagcbor::from_slice(buf)
        .map_err(|e| Error::MalformedNode(format!("invalid dag-cbor: {}", e)))
}

pub fn encode(value: &Ipld) -> Result<Vec<u8>, Error> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| Error::EncodeError(e.to_string()))
}

/// Collects every CID contained in `value`, together with the path leading
/// to it. Map keys and list indices are joined with `/`.
pub fn links(value: &Ipld) -> Vec<(String, Cid)> {
    let mut out = Vec::new();
    collect_links(value, &mut String::new(), &mut out);
    out
}

fn collect_links(value: &Ipld, prefix: &mut String, out: &mut Vec<(String, Cid)>) {
    match value {
        Ipld::Link(cid) => out.push((prefix.clone(), *cid)),
        Ipld::List(items) => {
            for (i, item) in items.iter().enumerate() {
                with_segment(prefix, &i.to_string(), |prefix| {
                    collect_links(item, prefix, out)
                });
            }
        }
        Ipld::Map(map) => {
            for (k, v) in map {
                with_segment(prefix, k, |prefix| collect_links(v, prefix, out));
            }
        }
        _ => {}
    }
}

fn with_segment(prefix: &mut String, segment: &str, f: impl FnOnce(&mut String)) {
    let len = prefix.len();
    if !prefix.is_empty() {
        prefix.push('/');
    }
    prefix.push_str(segment);
    f(prefix);
    prefix.truncate(len);
}

/// Looks up a single path segment inside a structured value.
pub fn lookup<'a>(value: &'a Ipld, segment: &str) -> Option<&'a Ipld> {
    match value {
        Ipld::Map(map) => map.get(segment),
        Ipld::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}
