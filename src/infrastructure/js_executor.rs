//! JS 执行器 - 基础设施层
//!
//! 持有门户页面，只暴露"执行 JS"与少量 DOM 操作能力，不认识报表或下载流程。

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};

/// JS 执行器
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        Ok(result.into_value().unwrap_or(JsonValue::Null))
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value).map_err(|e| AppError::script(e.to_string()))
    }

    /// 给输入框赋值
    pub async fn fill(&self, selector: &str, value: &str) -> AppResult<()> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.value = {val};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            val = js_string(value),
        );
        self.expect_true(js, selector).await
    }

    /// 点击元素（先滚动到可见区域）
    pub async fn click(&self, selector: &str) -> AppResult<()> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.scrollIntoView({{ block: 'center' }});
                el.click();
                return true;
            }})()"#,
            sel = js_string(selector),
        );
        self.expect_true(js, selector).await
    }

    /// 按链接文字点击
    pub async fn click_link_text(&self, text: &str) -> AppResult<()> {
        let js = format!(
            r#"(() => {{
                const link = Array.from(document.querySelectorAll('a'))
                    .find(a => a.textContent.trim() === {text});
                if (!link) return false;
                link.click();
                return true;
            }})()"#,
            text = js_string(text),
        );
        self.expect_true(js, text).await
    }

    /// 元素是否存在
    pub async fn exists(&self, selector: &str) -> AppResult<bool> {
        let js = format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        );
        self.eval_as(js).await
    }

    /// 元素可见文本（不存在时为 None）
    pub async fn text_of(&self, selector: &str) -> AppResult<Option<String>> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? el.textContent.trim() : null;
            }})()"#,
            sel = js_string(selector),
        );
        self.eval_as(js).await
    }

    async fn expect_true(&self, js: String, target: &str) -> AppResult<()> {
        if self.eval_as::<bool>(js).await? {
            Ok(())
        } else {
            Err(AppError::script(format!("页面上找不到 {}", target)))
        }
    }
}

/// 转为 JS 字符串字面量
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
