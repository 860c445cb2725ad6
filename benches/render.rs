use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(path).unwrap()
}

fn bench_render_multipart(c: &mut Criterion) {
    let raw = fixture("multipart.eml");
    let source = "{{datef \"2006-01-02\"}}_{{underscore .Subject}}\n{{.Text}}";

    c.bench_function("render_multipart", |b| {
        b.iter(|| mailtmpl::render::render_message(&raw, "text/plain", source).unwrap())
    });
}

fn bench_extract_large_multipart(c: &mut Criterion) {
    let mut raw = b"Subject: big\r\nContent-Type: multipart/mixed; boundary=xyz\r\n\r\n".to_vec();
    for i in 0..500 {
        let kind = if i % 2 == 0 { "text/plain" } else { "text/html" };
        raw.extend_from_slice(format!("--xyz\r\nContent-Type: {kind}\r\n\r\n").as_bytes());
        raw.extend_from_slice("line of body text\r\n".repeat(20).as_bytes());
    }
    raw.extend_from_slice(b"--xyz--\r\n");

    c.bench_function("extract_500_parts", |b| {
        b.iter(|| {
            let msg = mailtmpl::parser::message::read_message(&raw).unwrap();
            mailtmpl::parser::mime::extract_part(&msg, "text/plain").unwrap()
        })
    });
}

fn bench_parse_template(c: &mut Criterion) {
    let source = "{{if .Subject}}{{.Subject | printf \"%q\"}}{{else}}(none){{end}} \
                  {{with $d := .Date}}{{$d}}{{end}} {{len .Text}}";

    c.bench_function("parse_template", |b| {
        b.iter(|| mailtmpl::template::Template::new("bench").parse(source).unwrap())
    });
}

criterion_group!(
    benches,
    bench_render_multipart,
    bench_extract_large_multipart,
    bench_parse_template
);
criterion_main!(benches);
