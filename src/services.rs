// 基础服务

pub mod path_service;
