//! 批量操作内核：等值比较、差异定位、查找、填充与 XOR 掩码。
//!
//! # 设计背景（Why）
//! 这是 `Buffer` 比较/搜索路径以及编解码器拷贝路径共用的热点代码；所有函数
//! 直接在借出的 `&[u8]`/`&mut [u8]` 切片上工作，不关心切片来自哪种存储风格——
//! 调用方（`Buffer` 的实现）负责先把逻辑窗口收窄成连续切片。
//!
//! # 逻辑解析（How）
//! `index_of_byte` 使用 SWAR 技巧：对每 8 字节的一段计算
//! `(x - 0x0101010101010101) & !x & 0x8080808080808080`，非零说明该段内存在
//! 至少一个零字节（先与 needle 异或再代入），随后在候选段内逐字节定位。

const LO: u64 = 0x0101_0101_0101_0101;
const HI: u64 = 0x8080_8080_8080_8080;

/// 两段剩余字节是否逐字节相等（长度也必须相等）。
pub fn content_equals(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && mismatch(a, b) == -1
}

/// 第一个不同字节的下标；全部匹配且等长返回 -1；公共前缀匹配但长度不同返回
/// 公共长度 `min(a.len(), b.len())`。
pub fn mismatch(a: &[u8], b: &[u8]) -> isize {
    let n = a.len().min(b.len());
    let mut i = 0usize;
    while i + 8 <= n {
        let wa = u64::from_ne_bytes(a[i..i + 8].try_into().unwrap());
        let wb = u64::from_ne_bytes(b[i..i + 8].try_into().unwrap());
        if wa != wb {
            break;
        }
        i += 8;
    }
    while i < n {
        if a[i] != b[i] {
            return i as isize;
        }
        i += 1;
    }
    if a.len() == b.len() {
        -1
    } else {
        n as isize
    }
}

/// 在 `haystack` 中查找单字节 `needle` 的首个下标，SWAR 候选段 + 逐字节扫描。
pub fn index_of_byte(haystack: &[u8], needle: u8) -> isize {
    let pattern = LO.wrapping_mul(needle as u64);
    let mut i = 0usize;
    let n = haystack.len();
    while i + 8 <= n {
        let word = u64::from_ne_bytes(haystack[i..i + 8].try_into().unwrap());
        let xored = word ^ pattern;
        let candidate = xored.wrapping_sub(LO) & !xored & HI;
        if candidate != 0 {
            for (offset, &byte) in haystack[i..i + 8].iter().enumerate() {
                if byte == needle {
                    return (i + offset) as isize;
                }
            }
        }
        i += 8;
    }
    while i < n {
        if haystack[i] == needle {
            return i as isize;
        }
        i += 1;
    }
    -1
}

/// 在 `haystack` 的每个字节偏移处朴素匹配任意字节模式（多字节整数编码后的
/// 字节、缓冲区内容或字符串均可作为 `pattern` 传入）。
pub fn index_of_pattern(haystack: &[u8], pattern: &[u8]) -> isize {
    if pattern.is_empty() || pattern.len() > haystack.len() {
        return if pattern.is_empty() { 0 } else { -1 };
    }
    let first = pattern[0];
    let mut start = 0usize;
    loop {
        let rel = index_of_byte(&haystack[start..], first);
        if rel < 0 {
            return -1;
        }
        let at = start + rel as usize;
        if at + pattern.len() > haystack.len() {
            return -1;
        }
        if &haystack[at..at + pattern.len()] == pattern {
            return at as isize;
        }
        start = at + 1;
    }
}

/// 从 `position` 到 `limit` 重复写入 `pattern`；返回写入的完整拷贝次数。
/// 余下不足一个 `pattern` 长度的尾部字节不动。
pub fn fill(dst: &mut [u8], pattern: &[u8]) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    let count = dst.len() / pattern.len();
    for i in 0..count {
        dst[i * pattern.len()..(i + 1) * pattern.len()].copy_from_slice(pattern);
    }
    count
}

/// 用 4 字节掩码循环异或 `data`，8 字节为一组处理，并跟踪相位以兼容任意起始
/// 偏移（例如跨块续传时 `phase` 非零）。返回异或后下一次调用应使用的相位。
pub fn xor_mask_with_phase(data: &mut [u8], mask: u32, phase: u8) -> u8 {
    debug_assert!(phase < 4);
    let mask_bytes = mask.to_ne_bytes();
    let rotated = [
        mask_bytes[phase as usize % 4],
        mask_bytes[(phase as usize + 1) % 4],
        mask_bytes[(phase as usize + 2) % 4],
        mask_bytes[(phase as usize + 3) % 4],
    ];
    let wide = u64::from_ne_bytes([
        rotated[0], rotated[1], rotated[2], rotated[3], rotated[0], rotated[1], rotated[2],
        rotated[3],
    ]);
    let mut i = 0usize;
    let n = data.len();
    while i + 8 <= n {
        let word = u64::from_ne_bytes(data[i..i + 8].try_into().unwrap());
        data[i..i + 8].copy_from_slice(&(word ^ wide).to_ne_bytes());
        i += 8;
    }
    while i < n {
        data[i] ^= rotated[(i % 4)];
        i += 1;
    }
    ((phase as usize + n) % 4) as u8
}

/// 将 `src` 拷贝进 `dst` 同时对拷贝区间异或掩码，融合拷贝与掩码两步。
pub fn xor_mask_copy_with_phase(dst: &mut [u8], src: &[u8], mask: u32, phase: u8) -> u8 {
    dst[..src.len()].copy_from_slice(src);
    xor_mask_with_phase(&mut dst[..src.len()], mask, phase)
}
