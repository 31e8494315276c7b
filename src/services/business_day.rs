//! 工作日计算 - 业务能力层
//!
//! 纯函数：给定日期，返回之前最近的一个非周末、非公司假日的日期。

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::debug;

/// 公司假日（固定假日 + 浮动假日）
pub fn company_holidays(year: i32) -> BTreeSet<NaiveDate> {
    let mut holidays = BTreeSet::new();
    let fixed = [(1, 1), (6, 19), (7, 4), (12, 24), (12, 25)];
    holidays.extend(fixed.iter().filter_map(|&(m, d)| NaiveDate::from_ymd_opt(year, m, d)));

    // 独立日落在周末时的调休日
    if let Some(july_4) = NaiveDate::from_ymd_opt(year, 7, 4) {
        match july_4.weekday() {
            Weekday::Sat => holidays.insert(july_4 - Duration::days(1)),
            Weekday::Sun => holidays.insert(july_4 + Duration::days(1)),
            _ => false,
        };
    }

    let floating = [
        NaiveDate::from_weekday_of_month_opt(year, 1, Weekday::Mon, 3), // MLK Day
        NaiveDate::from_weekday_of_month_opt(year, 2, Weekday::Mon, 3), // Presidents' Day
        last_weekday_of_month(year, 5, Weekday::Mon),                   // Memorial Day
        NaiveDate::from_weekday_of_month_opt(year, 9, Weekday::Mon, 1), // Labor Day
    ];
    holidays.extend(floating.into_iter().flatten());

    if let Some(thanksgiving) = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Thu, 4) {
        holidays.insert(thanksgiving);
        holidays.insert(thanksgiving + Duration::days(1));
    }

    holidays
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = first_of_next.pred_opt()?;
    let back = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    Some(last - Duration::days(back as i64))
}

/// 是否为公司假日（同时考虑当年和上一年的假日集合）
pub fn is_company_holiday(date: NaiveDate) -> bool {
    company_holidays(date.year()).contains(&date)
        || company_holidays(date.year() - 1).contains(&date)
}

/// 是否为工作日
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_company_holiday(date)
}

/// 上一个工作日
///
/// 先减一天；遇到假日再减一天，遇到周六减一天、周日减两天，直到落在工作日。
pub fn previous_business_day(date: NaiveDate) -> NaiveDate {
    let mut candidate = date - Duration::days(1);
    loop {
        if is_company_holiday(candidate) {
            debug!("{} 是公司假日，再往前一天", candidate.format("%m/%d/%Y"));
            candidate -= Duration::days(1);
            continue;
        }
        match candidate.weekday() {
            Weekday::Sat => candidate -= Duration::days(1),
            Weekday::Sun => candidate -= Duration::days(2),
            _ => break,
        }
    }
    debug!(
        "{} 的上一个工作日: {}",
        date.format("%m/%d/%Y"),
        candidate.format("%m/%d/%Y")
    );
    candidate
}
