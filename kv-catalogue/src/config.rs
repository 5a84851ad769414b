/// 目录服务的运行参数；从文件或环境变量加载由调用方负责
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogueConfig {
    /// 每页商品数
    pub results_per_page: usize,
    /// 图片 URL 的前缀，例如 `https://shop.example.com`
    pub base_uri: String,
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        Self {
            results_per_page: 20,
            base_uri: String::new(),
        }
    }
}

impl CatalogueConfig {
    pub fn with_results_per_page(mut self, results_per_page: usize) -> Self {
        self.results_per_page = results_per_page.max(1);
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into().trim_end_matches('/').to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_normalises_values() {
        let config = CatalogueConfig::default()
            .with_results_per_page(0)
            .with_base_uri("http://shop/");
        assert_eq!(config.results_per_page, 1);
        assert_eq!(config.base_uri, "http://shop");
        assert_eq!(CatalogueConfig::default().results_per_page, 20);
    }
}
