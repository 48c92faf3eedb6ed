use rust_decimal::Decimal;

/// 5 日、25 日平均成交量與兩者比值
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeStats {
    pub vol5: Option<Decimal>,
    pub vol25: Option<Decimal>,
    pub ratio: Option<Decimal>,
}

impl VolumeStats {
    /// 由舊到新的成交量計算平均
    ///
    /// 資料不足 5 筆時全部為 None，不足 25 筆時只有 vol5。
    pub fn from_series(volumes: &[Decimal]) -> Self {
        let vol5 = tail_mean(volumes, 5);
        let vol25 = tail_mean(volumes, 25);
        let ratio = match (vol5, vol25) {
            (Some(short), Some(long)) => short.checked_div(long),
            _ => None,
        };

        VolumeStats { vol5, vol25, ratio }
    }
}

fn tail_mean(values: &[Decimal], n: usize) -> Option<Decimal> {
    if n == 0 || values.len() < n {
        return None;
    }

    let sum = values[values.len() - n..]
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
    sum.checked_div(Decimal::from(n))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_short_series() {
        let stats = VolumeStats::from_series(&[dec!(10), dec!(20), dec!(30), dec!(40), dec!(50)]);
        assert_eq!(stats.vol5, Some(dec!(30)));
        assert_eq!(stats.vol25, None);
        assert_eq!(stats.ratio, None);

        assert_eq!(VolumeStats::from_series(&[dec!(10); 4]), VolumeStats::default());
    }

    #[test]
    fn test_full_series() {
        let mut volumes = vec![dec!(100); 20];
        volumes.extend(vec![dec!(300); 5]);
        let stats = VolumeStats::from_series(&volumes);
        assert_eq!(stats.vol5, Some(dec!(300)));
        assert_eq!(stats.vol25, Some(dec!(140)));
        assert_eq!(stats.ratio.map(|r| r.round_dp(4)), Some(dec!(2.1429)));
    }

    #[test]
    fn test_zero_volume() {
        let stats = VolumeStats::from_series(&[Decimal::ZERO; 30]);
        assert_eq!(stats.vol5, Some(Decimal::ZERO));
        assert_eq!(stats.vol25, Some(Decimal::ZERO));
        assert_eq!(stats.ratio, None);
    }
}
