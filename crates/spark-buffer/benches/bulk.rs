use criterion::{Criterion, black_box};
use spark_buffer::bulk;
use std::{env, time::Duration};

/// 批量操作内核的基准测试：等值比较、字节查找与 XOR 掩码。
///
/// # 设计背景（Why）
/// 这三者是编解码器拷贝路径与 `Buffer` 比较/搜索默认方法共用的热点代码，
/// 基准覆盖典型负载大小（4 KiB）以验证 SWAR 路径相对逐字节实现的收益。
fn bench_content_equals(c: &mut Criterion) {
    let a = vec![0xABu8; 4096];
    let b = a.clone();
    c.bench_function("bulk_content_equals_4k", |bencher| {
        bencher.iter(|| black_box(bulk::content_equals(black_box(&a), black_box(&b))));
    });
}

fn bench_index_of_byte(c: &mut Criterion) {
    let mut haystack = vec![0u8; 4096];
    haystack[4095] = 0xFF;
    c.bench_function("bulk_index_of_byte_tail_4k", |bencher| {
        bencher.iter(|| black_box(bulk::index_of_byte(black_box(&haystack), black_box(0xFF))));
    });
}

fn bench_xor_mask(c: &mut Criterion) {
    let template = vec![0x55u8; 4096];
    c.bench_function("bulk_xor_mask_4k", |bencher| {
        bencher.iter(|| {
            let mut data = template.clone();
            bulk::xor_mask_with_phase(black_box(&mut data), black_box(0xDEAD_BEEF), 0);
            black_box(data)
        });
    });
}

fn main() {
    let mut quick_mode = false;
    for arg in env::args().skip(1) {
        if arg == "--quick" {
            quick_mode = true;
        }
    }

    let mut criterion = Criterion::default();
    if quick_mode {
        criterion = criterion
            .sample_size(10)
            .warm_up_time(Duration::from_millis(100))
            .measurement_time(Duration::from_millis(250));
    }

    bench_content_equals(&mut criterion);
    bench_index_of_byte(&mut criterion);
    bench_xor_mask(&mut criterion);
    criterion.final_summary();
}
