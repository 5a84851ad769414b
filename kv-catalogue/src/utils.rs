use tikv_client::Key;

use crate::Error;

/// 排序键中分隔名称与 id 的保留子串
pub(crate) const SORT_KEY_DELIMITER: &str = "::";

pub(crate) fn next_key(key: &Key) -> Key {
    let mut next_key = Into::<Vec<u8>>::into(key.clone());
    for i in (0..next_key.len()).rev() {
        if next_key[i] < 0xff {
            next_key[i] += 1;
            next_key.truncate(i + 1);
            return Key::from(next_key);
        }
    }
    Key::from(next_key)
}

/// 扫描续读时紧跟在 `key` 之后的最小键
pub(crate) fn key_after(key: &Key) -> Key {
    let mut after = Into::<Vec<u8>>::into(key.clone());
    after.push(0);
    Key::from(after)
}

/// 把展示名称转为可排序、可前缀搜索的形式：转小写，`::` 替换为一个空格
pub fn normalize(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.contains(SORT_KEY_DELIMITER) {
        lower.replace(SORT_KEY_DELIMITER, " ")
    } else {
        lower
    }
}

pub fn sort_key(name: &str, id: u64) -> String {
    format!("{}{}{}", normalize(name), SORT_KEY_DELIMITER, id)
}

/// 取最后一个 `::` 之后的 id
pub fn parse_sort_key(member: &str) -> Result<u64, Error> {
    let Some((_, id)) = member.rsplit_once(SORT_KEY_DELIMITER) else {
        return Err(Error::InvalidSortKey(member.to_string()));
    };
    id.parse()
        .map_err(|_| Error::InvalidSortKey(member.to_string()))
}

/// f64 -> 保持大小顺序的定长十进制字符串
pub(crate) fn sortable_score(score: f64) -> String {
    let bits = score.to_bits();
    // 负数翻转所有位，正数只翻转符号位
    let sortable_bits = if score.is_sign_negative() {
        !bits
    } else {
        bits ^ (1u64 << 63)
    };
    format!("{:020}", sortable_bits)
}

pub(crate) fn key_to_bytes(key: &Key) -> Vec<u8> {
    Into::<Vec<u8>>::into(key.clone())
}
