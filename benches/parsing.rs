use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::path::Path;

use mailpost::parser::{date, header, mime};
use mailpost::shortcode;

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(path).unwrap()
}

fn bench_headers(c: &mut Criterion) {
    let raw = fixture("photo.eml");

    c.bench_function("parse_headers_photo", |b| {
        b.iter(|| header::parse_headers(header::split_message(black_box(&raw)).0))
    });
    c.bench_function("parse_date_rfc2822", |b| {
        b.iter(|| date::parse_date(black_box("Sat, 28 Mar 2015 10:15:00 +0100")))
    });
}

fn bench_mime(c: &mut Criterion) {
    let raw = fixture("photo.eml");

    c.bench_function("mime_select_body_photo", |b| {
        b.iter(|| {
            let msg = mime::parse_message(black_box(&raw)).unwrap();
            mime::select_body(&msg).map(|body| body.content.len())
        })
    });
    c.bench_function("mime_list_attachments_photo", |b| {
        b.iter(|| {
            let msg = mime::parse_message(black_box(&raw)).unwrap();
            mime::list_attachments(&msg).len()
        })
    });
}

fn bench_shortcodes(c: &mut Criterion) {
    let text = "Trip notes [category travel food] [tag lisbon] [tag coffee] [genre jazz] \
                [pin 7391] [post-format aside] and a [link] that stays."
        .repeat(20);
    let names = shortcode::known_names(&["genre".to_string()]);

    c.bench_function("shortcode_find_category", |b| {
        b.iter(|| shortcode::find("category", black_box(&text)))
    });
    c.bench_function("shortcode_strip_known", |b| {
        b.iter(|| shortcode::strip_known(black_box(&text), &names))
    });
}

criterion_group!(benches, bench_headers, bench_mime, bench_shortcodes);
criterion_main!(benches);
