// ==========================================
// IT 资产处置 ERP - 金额值对象
// ==========================================
// 职责: 以最小货币单位(分)保存金额,精确解析十进制文本,四舍五入到 2 位小数
// 红线: 台账中不出现浮点累加
// ==========================================

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;
use std::ops::{Add, Sub};

/// 金额上限对应的最大位数 (分),避免 i64 溢出
const MAX_CENT_DIGITS: i64 = 17;

/// 金额 (单位: 分)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// 转换为主单位浮点数 (仅用于展示/JSON 输出)
    pub fn to_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// 逐项 checked 求和; 任一步溢出返回 None
    pub fn checked_sum<I: IntoIterator<Item = Money>>(iter: I) -> Option<Money> {
        iter.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    /// 解析十进制文本,四舍五入(half-up)到分
    ///
    /// 支持: "100", "33.335", ".5", "+12.5", "1.5e3", "-7.25"
    /// 拒绝: 空串, "NaN", "inf", "12,50", "abc"
    pub fn parse_decimal(text: &str) -> Option<Money> {
        let s = text.trim();
        let (negative, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let magnitude = parse_unsigned_cents(s)?;
        Some(Money(if negative { -magnitude } else { magnitude }))
    }

    /// 解析非负金额; 任何负号(包括 "-0")都视为非法
    pub fn parse_non_negative(text: &str) -> Option<Money> {
        if text.trim_start().starts_with('-') {
            return None;
        }
        Self::parse_decimal(text)
    }

    /// 从浮点数构造 (NaN / 无穷 / 负数返回 None)
    pub fn from_f64(value: f64) -> Option<Money> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        // f64 的 Display 输出最短可往返十进制表示,按文本精确取整
        Self::parse_non_negative(&value.to_string())
    }

    /// 从 JSON 值构造非负金额 (数字或数字字符串)
    pub fn from_json(value: &JsonValue) -> Option<Money> {
        match value {
            JsonValue::Number(n) => Self::parse_non_negative(&n.to_string()),
            JsonValue::String(s) => Self::parse_non_negative(s),
            _ => None,
        }
    }

    /// 平均到 n 份并四舍五入(half-up)到分
    ///
    /// n == 0 返回 None
    pub fn div_round_half_up(&self, n: u64) -> Option<Money> {
        if n == 0 {
            return None;
        }
        let total = self.0 as i128;
        let n = n as i128;
        let magnitude = (2 * total.abs() + n) / (2 * n);
        let signed = if total < 0 { -magnitude } else { magnitude };
        i64::try_from(signed).ok().map(Money)
    }

    /// 精确商 (主单位, 不取整); n == 0 返回 None
    ///
    /// 乘回 n 与原值的差远小于 1 分, 不随 n 放大
    pub fn exact_share(&self, n: u64) -> Option<f64> {
        if n == 0 {
            return None;
        }
        Some(self.0 as f64 / n as f64 / 100.0)
    }
}

/// 无符号十进制文本 -> 分
fn parse_unsigned_cents(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }

    let (mantissa, exponent) = match s.find(|c: char| c == 'e' || c == 'E') {
        Some(idx) => (&s[..idx], s[idx + 1..].parse::<i32>().ok()?),
        None => (s, 0),
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes())
        .map(|b| b - b'0')
        .collect();

    if digits.iter().all(|&d| d == 0) {
        return Some(0);
    }

    // 以"分"为单位的整数部分位数
    let keep = int_part.len() as i64 + exponent as i64 + 2;

    // 去掉前导零后再判断量级
    let leading_zeros = digits.iter().take_while(|&&d| d == 0).count() as i64;
    if keep - leading_zeros > MAX_CENT_DIGITS {
        return None;
    }

    let mut cents: i64 = 0;
    for i in 0..keep.max(0) {
        let d = digits.get(i as usize).copied().unwrap_or(0);
        cents = cents.checked_mul(10)?.checked_add(d as i64)?;
    }

    if keep >= 0 {
        if let Some(&next) = digits.get(keep as usize) {
            if next >= 5 {
                cents = cents.checked_add(1)?;
            }
        }
    }

    Some(cents)
}

// 运算符饱和而非 panic; 台账写入路径使用 checked_add 拒绝溢出
impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// JSON 中金额以主单位数字输出 (例如 33.33)
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        let parsed = match &value {
            JsonValue::Number(n) => Money::parse_decimal(&n.to_string()),
            JsonValue::String(s) => Money::parse_decimal(s),
            _ => None,
        };
        parsed.ok_or_else(|| serde::de::Error::custom(format!("无效金额: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rounds_half_up() {
        assert_eq!(Money::parse_decimal("33.335"), Some(Money::from_cents(3334)));
        assert_eq!(Money::parse_decimal("33.334"), Some(Money::from_cents(3333)));
        assert_eq!(Money::parse_decimal("1.005"), Some(Money::from_cents(101)));
        assert_eq!(Money::parse_decimal("0.005"), Some(Money::from_cents(1)));
        assert_eq!(Money::parse_decimal("0.0049"), Some(Money::ZERO));
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(Money::parse_decimal("100"), Some(Money::from_cents(10_000)));
        assert_eq!(Money::parse_decimal(".5"), Some(Money::from_cents(50)));
        assert_eq!(Money::parse_decimal("5."), Some(Money::from_cents(500)));
        assert_eq!(Money::parse_decimal("+12.5"), Some(Money::from_cents(1250)));
        assert_eq!(Money::parse_decimal("1.5e3"), Some(Money::from_cents(150_000)));
        assert_eq!(Money::parse_decimal("5e-3"), Some(Money::from_cents(1)));
        assert_eq!(Money::parse_decimal("-7.25"), Some(Money::from_cents(-725)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", "  ", ".", "NaN", "inf", "-inf", "12,50", "abc", "1e", "1.2.3", "1e999"] {
            assert_eq!(Money::parse_decimal(text), None, "should reject {:?}", text);
        }
    }

    #[test]
    fn test_non_negative_rejects_any_sign() {
        assert_eq!(Money::parse_non_negative("-1"), None);
        assert_eq!(Money::parse_non_negative("-0"), None);
        assert_eq!(Money::parse_non_negative("0"), Some(Money::ZERO));
    }

    #[test]
    fn test_from_f64_and_json() {
        assert_eq!(Money::from_f64(f64::NAN), None);
        assert_eq!(Money::from_f64(f64::INFINITY), None);
        assert_eq!(Money::from_f64(-0.5), None);
        assert_eq!(Money::from_f64(19.99), Some(Money::from_cents(1999)));

        assert_eq!(Money::from_json(&json!(40)), Some(Money::from_cents(4000)));
        assert_eq!(Money::from_json(&json!("12.345")), Some(Money::from_cents(1235)));
        assert_eq!(Money::from_json(&json!(null)), None);
        assert_eq!(Money::from_json(&json!(true)), None);
        assert_eq!(Money::from_json(&json!(-3)), None);
    }

    #[test]
    fn test_div_round_half_up() {
        let total = Money::from_cents(10_000);
        assert_eq!(total.div_round_half_up(3), Some(Money::from_cents(3333)));
        assert_eq!(Money::from_cents(20_000).div_round_half_up(3), Some(Money::from_cents(6667)));
        assert_eq!(Money::from_cents(5).div_round_half_up(2), Some(Money::from_cents(3)));
        assert_eq!(total.div_round_half_up(0), None);
    }

    #[test]
    fn test_zero_with_large_exponent_is_valid() {
        assert_eq!(Money::parse_non_negative("0e99"), Some(Money::ZERO));
        assert_eq!(Money::parse_non_negative("000.000e40"), Some(Money::ZERO));
        assert_eq!(Money::parse_non_negative("1e99"), None);
        assert_eq!(Money::from_json(&json!("0e99")), Some(Money::ZERO));
    }

    #[test]
    fn test_arithmetic_never_panics_at_bounds() {
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max + Money::from_cents(1), max);
        assert_eq!(Money::from_cents(i64::MIN) - Money::from_cents(1), Money::from_cents(i64::MIN));
        assert_eq!(max.checked_add(Money::from_cents(1)), None);
        assert_eq!(Money::checked_sum([max, Money::from_cents(1)]), None);
        assert_eq!(
            Money::checked_sum([Money::from_cents(5), Money::from_cents(7)]),
            Some(Money::from_cents(12))
        );
        assert_eq!([max, max].into_iter().sum::<Money>(), max);
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(Money::from_cents(3334).to_string(), "33.34");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(serde_json::to_value(Money::from_cents(3333)).unwrap(), json!(33.33));
        let back: Money = serde_json::from_value(json!("12.10")).unwrap();
        assert_eq!(back, Money::from_cents(1210));
    }
}
